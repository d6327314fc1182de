pub mod completions;
pub mod crypt;
pub mod scan;
pub mod serve;
pub mod user;
