pub mod command;
pub mod fastq;
pub mod file;
pub mod gtf;
pub mod plotting;
pub mod sam;
pub mod stats;
pub mod streams;
pub mod table;
