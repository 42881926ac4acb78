pub mod assets;
pub mod crossref;
pub mod import;
pub mod model;
pub mod table;
