pub mod inventory;
pub mod inventory_ledger;
pub mod product_resolver;
pub mod quality_checks;
pub mod return_issuer;
pub mod returns;
