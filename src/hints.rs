//! Root hints.
//!
//! Resolution always starts at the root zone. The addresses of its name
//! servers are well known and change very rarely, so they are compiled in.
//! The order of [`ROOT_SERVERS`] is the order in which the servers are
//! tried.

use std::net::Ipv4Addr;

/// The IPv4 addresses of the thirteen root name servers.
///
/// These are `a.root-servers.net` through `m.root-servers.net` in that
/// order.
pub const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(199, 9, 14, 201),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];
