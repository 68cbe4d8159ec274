pub mod check;
pub mod config;
pub mod detect;
pub mod ensure;
pub mod locate;
pub mod redownload;
pub mod testdata;
