pub mod clients;
pub mod config;
pub mod consumers;
pub mod domain;
pub mod events;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod utils;
