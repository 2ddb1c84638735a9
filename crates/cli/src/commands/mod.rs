pub mod delete;
pub mod list;
pub mod run;
pub mod state;
pub mod version;
