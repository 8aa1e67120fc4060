//! Iterative resolution starting at the root.
//!
//! The [`Resolver`] finds the addresses of a domain name without relying on
//! any recursive resolver. It asks the root servers, follows the referrals
//! they hand out by querying the servers named in the glue records, and
//! keeps going until some server answers.
//!
//! Resolution of a single record type happens in two stages:
//!
//! * [`Resolver::locate`] walks the root servers in the order of
//!   [`ROOT_SERVERS`]. Their replies are kept in the [`DomainCache`] per
//!   top-level domain, so each root server is asked about each TLD only
//!   once. Whenever a root server answers, that answer is the result.
//!   Whenever it refers, the glue addresses are chased.
//! * [`Resolver::chase`] queries a single server without consulting the
//!   cache and descends into referrals depth-first, trying glue addresses
//!   in the order they appear in the additional section. The first answer
//!   found ends the search. If the answer is an alias, resolution of the
//!   alias target starts over at the root.
//!
//! Every referral followed and every alias restarted adds one to a depth
//! counter that is carried through the whole resolution. Once it exceeds
//! the configured maximum, the branch is abandoned. This bounds referral
//! loops. In addition, a lookup remembers the alias targets it has
//! restarted with and never restarts with the same name twice, and it
//! follows at most [`MAX_ALIASES`] aliases. This keeps alias loops from
//! fanning out over all root servers again on every turn.
//!
//! [`Resolver::resolve`] runs both stages for A and AAAA records and
//! collects the addresses into a [`ResultSet`]. A name that can’t be
//! resolved simply produces an empty result set.

#![warn(missing_docs)]

use crate::cache::{cache_key, DomainCache};
use crate::hints::ROOT_SERVERS;
use crate::response::{RecordData, Reply, Response};
use crate::transport::Transport;
use crate::utils::config::DefMinMax;
use domain::base::iana::Rtype;
use domain::base::name::Name;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::vec;
use tracing::{debug, trace, warn};

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the maximum resolution depth.
const MAX_DEPTH: DefMinMax<usize> = DefMinMax::new(30, 1, 255);

/// The maximum number of aliases followed during a single lookup.
pub const MAX_ALIASES: usize = 8;

//------------ Config --------------------------------------------------------

/// Configuration of a resolver.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum depth of referrals and aliases.
    max_depth: usize,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the maximum depth.
    ///
    /// The depth grows by one with every referral that is followed and
    /// with every alias whose target is resolved.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Sets the maximum depth.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_max_depth(&mut self, value: usize) {
        self.max_depth = MAX_DEPTH.limit(value)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH.default(),
        }
    }
}

//------------ Resolver ------------------------------------------------------

/// An iterative resolver.
///
/// The resolver owns its [`DomainCache`]. Share it between tasks by
/// wrapping it in an arc.
#[derive(Debug)]
pub struct Resolver<T> {
    /// The transport used to talk to name servers.
    transport: T,

    /// The root server replies per TLD.
    cache: DomainCache,

    /// The configuration.
    config: Config,
}

impl<T> Resolver<T> {
    /// Creates a new resolver with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, Config::default())
    }

    /// Creates a new resolver with the given configuration.
    pub fn with_config(transport: T, config: Config) -> Self {
        Resolver {
            transport,
            cache: DomainCache::new(),
            config,
        }
    }

    /// Returns a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a reference to the cache.
    pub fn cache(&self) -> &DomainCache {
        &self.cache
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<T: Transport> Resolver<T> {
    /// Resolves the IPv4 and IPv6 addresses of a name.
    pub async fn resolve(&self, qname: &Name<Vec<u8>>) -> ResultSet {
        debug!("resolving {qname}");
        let mut res = ResultSet::default();
        if let Some(response) = self.locate(qname, Rtype::A).await {
            res.a = addresses(&response, Rtype::A);
        }
        if let Some(response) = self.locate(qname, Rtype::AAAA).await {
            res.aaaa = addresses(&response, Rtype::AAAA);
        }
        debug!(
            "resolved {qname}: {} A, {} AAAA",
            res.a.len(),
            res.aaaa.len()
        );
        res
    }

    /// Finds the answer for a question starting at the root servers.
    ///
    /// Returns the first response with a non-empty answer section or
    /// `None` if none of the root servers leads to one. The answer may
    /// contain records of other types than `qtype`.
    pub async fn locate(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
    ) -> Option<Response> {
        self.walk(qname, qtype, 0, &mut Aliases::new(qname)).await
    }

    /// Queries `server` and follows its referrals.
    ///
    /// If the server answers, returns the answer. If the answer is an alias
    /// and `qtype` isn’t CNAME, returns whatever [`locate`][Self::locate]
    /// returns for the alias target instead. If the server refers, returns
    /// the first answer found below it or, failing that, the referral
    /// itself. A response with neither answers nor additional records is
    /// returned as is. Returns `None` if the server does not respond, if
    /// `depth` exceeds the maximum depth, or if an alias leads back to a
    /// name already looked up.
    pub async fn chase(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
        depth: usize,
    ) -> Option<Response> {
        self.descend(qname, qtype, server, depth, &mut Aliases::new(qname))
            .await
    }

    /// Chases `server` as part of a lookup that already followed `aliases`.
    async fn descend(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
        depth: usize,
        aliases: &mut Aliases,
    ) -> Option<Response> {
        let top = match self.step(qname, qtype, server, depth, aliases).await
        {
            Step::NoResponse => return None,
            Step::Done(response) => return response,
            Step::Referral(response) => response,
        };

        // Depth-first descent. Each level holds the glue addresses of one
        // referral that haven’t been tried yet.
        let mut levels = vec![Level::new(&top, depth + 1)];
        while let Some(level) = levels.last_mut() {
            let Some(addr) = level.glue.next() else {
                levels.pop();
                continue;
            };
            let depth = level.depth;
            match self.step(qname, qtype, addr.into(), depth, aliases).await {
                Step::Done(Some(response)) if response.has_answers() => {
                    return Some(response)
                }
                Step::Referral(response) => {
                    levels.push(Level::new(&response, depth + 1))
                }
                _ => {}
            }
        }
        Some(top)
    }

    /// Walks the root servers.
    ///
    /// This is [`locate`][Self::locate] with an explicit depth so that
    /// alias restarts count toward the maximum. It returns a boxed future
    /// because it is reentered via [`step`][Self::step].
    fn walk<'a>(
        &'a self,
        qname: &'a Name<Vec<u8>>,
        qtype: Rtype,
        depth: usize,
        aliases: &'a mut Aliases,
    ) -> BoxFuture<'a, Option<Response>> {
        async move {
            if self.too_deep(qname, depth) {
                return None;
            }
            let key = cache_key(qname);
            for root in ROOT_SERVERS {
                let server = IpAddr::V4(root);
                let reply = self
                    .cache
                    .get_or_fetch(&key, server, || {
                        self.fetch(qname, qtype, server)
                    })
                    .await;
                let response = match reply {
                    Reply::Message(response) => response,
                    Reply::Failed(err) => {
                        trace!("root {server} unusable for {key}: {err}");
                        continue;
                    }
                };
                if response.has_answers() {
                    return Some(response);
                }
                for addr in response.glue() {
                    let found = self
                        .descend(qname, qtype, addr.into(), depth + 1, aliases)
                        .await;
                    if let Some(found) = found {
                        if found.has_answers() {
                            return Some(found);
                        }
                    }
                }
            }
            debug!("no root server leads to {qname} {qtype}");
            None
        }
        .boxed()
    }

    /// Queries a single server and classifies the response.
    async fn step(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
        depth: usize,
        aliases: &mut Aliases,
    ) -> Step {
        if self.too_deep(qname, depth) {
            return Step::NoResponse;
        }
        let response = match self.fetch(qname, qtype, server).await {
            Reply::Message(response) => response,
            Reply::Failed(_) => return Step::NoResponse,
        };
        if response.has_answers() {
            if qtype != Rtype::CNAME {
                if let Some(target) = response.alias_target() {
                    let target = target.clone();
                    if !aliases.follow(&target) {
                        debug!("not following alias {qname} to {target}");
                        return Step::Done(None);
                    }
                    trace!("{qname} is an alias for {target}");
                    return Step::Done(
                        self.walk(&target, qtype, depth + 1, aliases).await,
                    );
                }
            }
            Step::Done(Some(response))
        } else if response.has_additional() {
            Step::Referral(response)
        } else {
            Step::Done(Some(response))
        }
    }

    /// Sends a query via the transport.
    async fn fetch(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Reply {
        let res = self.transport.query(qname, qtype, server).await;
        match &res {
            Ok(_) => trace!("{server} responded for {qname} {qtype}"),
            Err(err) => {
                debug!("no response from {server} for {qname} {qtype}: {err}")
            }
        }
        res.into()
    }

    /// Checks the depth and logs if it is exceeded.
    fn too_deep(&self, qname: &Name<Vec<u8>>, depth: usize) -> bool {
        if depth > self.config.max_depth {
            warn!(
                "giving up on {qname}: maximum depth of {} exceeded",
                self.config.max_depth
            );
            true
        } else {
            false
        }
    }
}

//------------ Step ----------------------------------------------------------

/// What a single server had to say.
enum Step {
    /// The server did not respond or the depth was exceeded.
    NoResponse,

    /// The search below this server is over.
    ///
    /// This is an answer, the result of following an alias, or a response
    /// without anything to follow.
    Done(Option<Response>),

    /// The server referred to other servers.
    Referral(Response),
}

//------------ Aliases -------------------------------------------------------

/// The names a single lookup has started from.
struct Aliases {
    /// The queried name and all alias targets followed so far.
    seen: HashSet<Name<Vec<u8>>>,
}

impl Aliases {
    /// Creates the set for a lookup of `qname`.
    fn new(qname: &Name<Vec<u8>>) -> Self {
        Aliases {
            seen: HashSet::from([qname.clone()]),
        }
    }

    /// Records that `target` is about to be followed.
    ///
    /// Returns `false` if it has been followed before or if the lookup
    /// already followed the maximum number of aliases.
    fn follow(&mut self, target: &Name<Vec<u8>>) -> bool {
        if self.seen.len() > MAX_ALIASES {
            return false;
        }
        self.seen.insert(target.clone())
    }
}

//------------ Level ---------------------------------------------------------

/// One level of the depth-first descent.
struct Level {
    /// The glue addresses left to try.
    glue: vec::IntoIter<Ipv4Addr>,

    /// The depth of the servers on this level.
    depth: usize,
}

impl Level {
    /// Creates the level below a referral.
    fn new(referral: &Response, depth: usize) -> Self {
        Level {
            glue: referral.glue().collect::<Vec<_>>().into_iter(),
            depth,
        }
    }
}

//------------ ResultSet -----------------------------------------------------

/// The addresses found for a name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultSet {
    /// The IPv4 addresses.
    a: Vec<Address>,

    /// The IPv6 addresses.
    aaaa: Vec<Address>,
}

impl ResultSet {
    /// Creates a result set from its IPv4 and IPv6 addresses.
    pub fn from_parts(a: Vec<Address>, aaaa: Vec<Address>) -> Self {
        ResultSet { a, aaaa }
    }

    /// Returns the addresses from A records.
    pub fn a(&self) -> &[Address] {
        &self.a
    }

    /// Returns the addresses from AAAA records.
    pub fn aaaa(&self) -> &[Address] {
        &self.aaaa
    }

    /// Returns whether no address was found at all.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.aaaa.is_empty()
    }

    /// Returns an iterator over all addresses, IPv4 first.
    pub fn iter(&self) -> impl Iterator<Item = &Address> + '_ {
        self.a.iter().chain(self.aaaa.iter())
    }
}

//--- Display

impl fmt::Display for ResultSet {
    /// Formats the result set one address per line.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for addr in self.iter() {
            writeln!(f, "{}", addr)?;
        }
        Ok(())
    }
}

//------------ Address -------------------------------------------------------

/// An address together with the name it was found at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    /// The owner name of the address record.
    name: Name<Vec<u8>>,

    /// The address.
    addr: IpAddr,
}

impl Address {
    /// Creates a new address.
    pub fn new(name: Name<Vec<u8>>, addr: IpAddr) -> Self {
        Address { name, addr }
    }

    /// Returns the owner name of the address record.
    ///
    /// For aliases, this is the name of the alias target rather than the
    /// name that was asked for.
    pub fn name(&self) -> &Name<Vec<u8>> {
        &self.name
    }

    /// Returns the address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

//--- Display

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            IpAddr::V4(addr) => write!(f, "{} has address {}", self.name, addr),
            IpAddr::V6(addr) => {
                write!(f, "{} has IPv6 address {}", self.name, addr)
            }
        }
    }
}

//------------ Helpers -------------------------------------------------------

/// Collects the addresses of type `rtype` from the answer section.
fn addresses(response: &Response, rtype: Rtype) -> Vec<Address> {
    response
        .answers()
        .iter()
        .filter(|entry| entry.rtype() == rtype)
        .filter_map(|entry| {
            let addr = match entry.data() {
                RecordData::A(addr) => IpAddr::V4(*addr),
                RecordData::Aaaa(addr) => IpAddr::V6(*addr),
                _ => return None,
            };
            Some(Address::new(entry.owner().clone(), addr))
        })
        .collect()
}

//============ Testing =======================================================
