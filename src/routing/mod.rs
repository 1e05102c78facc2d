pub mod bucket;
pub mod contact;
pub mod table;
