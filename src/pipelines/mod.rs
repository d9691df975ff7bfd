pub mod cluster;
pub mod diffexpr;
pub mod gene_filter;
pub mod gtf_regions;
pub mod logos;
pub mod merge_counts;
pub mod normalize;
pub mod plot_tss;
pub mod sam_filter;
pub mod sampling;
pub mod trim;
