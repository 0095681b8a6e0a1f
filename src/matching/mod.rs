pub mod grouper;
pub mod similarity;
pub mod teams;
