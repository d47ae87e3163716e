pub mod common;
pub mod chipseq;
pub mod quantseq;
