pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod import;
pub mod service;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Disposal, DisposalId, Lot, LotId, RealizedGainFragment, TaxMethod, Term, TimeMs,
    UserId,
};
pub use engine::{DisposalMatcher, LedgerError, LotLedger, TaxLiability, TaxRate, TaxRates};
pub use error::AppError;
pub use service::{LedgerService, ServiceError};
pub use store::{LotRepository, MemoryStore, StoreError};
