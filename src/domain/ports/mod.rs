mod adapter_client;
mod binding_reader;
mod binding_store;
mod health_source;
mod log_sink;
mod log_writer;

pub use adapter_client::AdapterClient;
pub use binding_reader::BindingReader;
pub use binding_store::BindingStore;
pub use health_source::HealthSource;
pub use log_sink::LogSink;
pub use log_writer::{LogWriter, WriterFactory};
