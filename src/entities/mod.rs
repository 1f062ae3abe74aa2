pub mod inventory;
pub mod location;
pub mod quality_check;
pub mod reception;
pub mod returns;
pub mod warehouse_product;
