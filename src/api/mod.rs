mod client;
mod envelope;
pub mod mock;
mod transport;
#[cfg(test)]
mod tests;

pub use client::BoothApi;
pub use envelope::{ApiRequest, Envelope, Method};
pub use mock::{MockReply, MockTransport};
pub use transport::{cancellable, HttpTransport, Transport};
