pub mod commission_service;
pub mod settlement_service;
pub mod wallet_service;
