//! An iterative DNS resolver.
//!
//! This crate resolves domain names to their IPv4 and IPv6 addresses by
//! starting at the root name servers and following referrals down the
//! DNS tree until some server answers. It does not need a recursive
//! resolver to do so.
//!
//! The crate consists of the following modules:
//!
//! * [resolver] contains the resolution engine, [`Resolver`],
//! * [cache] contains the per-TLD cache of root server replies the
//!   resolver keeps,
//! * [hints] has the addresses of the root servers,
//! * [response] contains the resolver’s model of DNS responses,
//! * [transport] defines how queries are sent to name servers and
//!   provides the UDP transport used in production, and
//! * [server] contains a DNS server answering queries through a resolver.
//!
//! The `rootwalk` binary runs the server.
//!
//! # Example
//!
//! ```no_run
//! use domain::base::Name;
//! use rootwalk::transport::UdpTransport;
//! use rootwalk::Resolver;
//!
//! # async fn run() {
//! let resolver = Resolver::new(UdpTransport::new());
//! let qname = Name::vec_from_str("example.com").unwrap();
//! let res = resolver.resolve(&qname).await;
//! print!("{res}");
//! # }
//! ```

pub use self::resolver::{Resolver, ResultSet};

pub mod cache;
pub mod hints;
pub mod resolver;
pub mod response;
pub mod server;
pub mod transport;

mod utils;
