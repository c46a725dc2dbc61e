pub mod consumer;

pub use consumer::StoreConsumer;
