pub mod catalog;
pub mod deform;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod mtrl;
pub mod paths;
pub mod race;
pub mod resolve;
pub mod settings;
pub mod slot;
