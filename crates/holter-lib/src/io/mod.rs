pub mod beats;
pub mod csv;
pub mod table;
