//! A scripted network of name servers.
//!
//! [`Network`] implements the resolver’s transport trait by handing each
//! query to a closure registered for the server address. Servers without
//! a closure, and closures returning `None`, behave like servers that
//! never respond. Every query is recorded so tests can check which servers
//! were contacted.

#![allow(dead_code)]

use domain::base::iana::Rtype;
use domain::base::Name;
use parking_lot::Mutex;
use rootwalk::hints::ROOT_SERVERS;
use rootwalk::response::{Entry, Response};
use rootwalk::transport::{Error, Transport};
use std::collections::HashMap;
use std::future::{ready, Future};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

//------------ Network -------------------------------------------------------

/// How a scripted server reacts to a question.
type Handler =
    Box<dyn Fn(&Name<Vec<u8>>, Rtype) -> Option<Response> + Send + Sync>;

/// A query seen by the network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    pub server: IpAddr,
    pub qname: Name<Vec<u8>>,
    pub qtype: Rtype,
}

#[derive(Default)]
pub struct Network {
    servers: HashMap<IpAddr, Handler>,
    log: Mutex<Vec<Query>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server.
    pub fn server<F>(mut self, addr: impl Into<IpAddr>, handler: F) -> Self
    where
        F: Fn(&Name<Vec<u8>>, Rtype) -> Option<Response>
            + Send
            + Sync
            + 'static,
    {
        self.servers.insert(addr.into(), Box::new(handler));
        self
    }

    /// Adds a server that always gives the same response.
    pub fn fixed(self, addr: impl Into<IpAddr>, response: Response) -> Self {
        self.server(addr, move |_, _| Some(response.clone()))
    }

    /// Returns all queries in the order they were sent.
    pub fn queries(&self) -> Vec<Query> {
        self.log.lock().clone()
    }

    /// Returns the number of queries sent to `addr`.
    pub fn count(&self, addr: impl Into<IpAddr>) -> usize {
        let addr = addr.into();
        self.log.lock().iter().filter(|q| q.server == addr).count()
    }

    /// Returns the number of queries sent in total.
    pub fn total(&self) -> usize {
        self.log.lock().len()
    }
}

impl Transport for Network {
    fn query<'a>(
        &'a self,
        qname: &'a Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>
    {
        self.log.lock().push(Query {
            server,
            qname: qname.clone(),
            qtype,
        });
        let res = self
            .servers
            .get(&server)
            .and_then(|handler| handler(qname, qtype))
            .ok_or(Error::Timeout);
        Box::pin(ready(res))
    }
}

//------------ Helpers -------------------------------------------------------

pub fn name(s: &str) -> Name<Vec<u8>> {
    Name::vec_from_str(s).unwrap()
}

/// Returns the address of the root server at position `idx`.
pub fn root(idx: usize) -> IpAddr {
    ROOT_SERVERS[idx].into()
}

/// A referral to the given name servers with IPv4 glue.
pub fn referral(servers: &[(&str, Ipv4Addr)]) -> Response {
    Response::new(
        Vec::new(),
        servers
            .iter()
            .map(|(ns, addr)| Entry::a(name(ns), *addr))
            .collect(),
    )
}

/// An answer with a single A record.
pub fn answer_a(owner: &str, addr: Ipv4Addr) -> Response {
    Response::new(vec![Entry::a(name(owner), addr)], Vec::new())
}

/// An answer with a single AAAA record.
pub fn answer_aaaa(owner: &str, addr: Ipv6Addr) -> Response {
    Response::new(vec![Entry::aaaa(name(owner), addr)], Vec::new())
}

/// An answer with a single CNAME record.
pub fn alias(owner: &str, target: &str) -> Response {
    Response::new(vec![Entry::cname(name(owner), name(target))], Vec::new())
}
