mod api_binding_reader;
mod dashmap_binding_store;
mod rpc_adapter_client;
mod tls_writer;

pub use api_binding_reader::{
    build_http_client, ApiBindingReader, ApiTlsOptions, DrainFilter, HostResolver, SystemResolver,
};
pub use dashmap_binding_store::DashMapBindingStore;
pub use rpc_adapter_client::RpcAdapterClient;
pub use tls_writer::{TlsWriter, TlsWriterFactory};
