pub mod fasta;
pub mod fastq;
pub mod reads;
pub mod tsv;
