pub mod replay;
pub mod show;
