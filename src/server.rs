//! A DNS server answering address queries via the resolver.
//!
//! The [`Server`] listens on a UDP socket. For every query it receives, it
//! resolves the queried name through its [`Resolver`] and answers with one
//! A or AAAA record per address found, regardless of the type that was
//! asked for. Each request is handled in its own task, so a slow
//! resolution does not hold up other clients.

use crate::resolver::{ResultSet, Resolver};
use crate::transport::Transport;
use domain::base::iana::{Class, Rcode};
use domain::base::message_builder::PushError;
use domain::base::name::{Name, ToName};
use domain::base::{Message, MessageBuilder, Ttl};
use domain::rdata::{Aaaa, A};
use std::error;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

//------------ Configuration Constants ---------------------------------------

/// The host to listen on by default.
const DEF_HOST: &str = "localhost";

/// The port to listen on by default.
const DEF_PORT: u16 = 5354;

/// The TTL of the address records in replies.
const REPLY_TTL: u32 = 60;

/// Size of the receive buffer for requests.
const RECV_SIZE: usize = 1232;

//------------ Config --------------------------------------------------------

/// The listen address of a server.
#[derive(Clone, Debug)]
pub struct Config {
    /// The host name or address to listen on.
    host: String,

    /// The port to listen on.
    port: u16,
}

impl Config {
    /// Creates a new config listening on `host` and `port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Config {
            host: host.into(),
            port,
        }
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEF_HOST, DEF_PORT)
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

//------------ Server --------------------------------------------------------

/// A UDP server answering with resolved addresses.
#[derive(Debug)]
pub struct Server<T> {
    /// The listening socket.
    sock: Arc<UdpSocket>,

    /// The resolver answering the queries.
    resolver: Arc<Resolver<T>>,
}

impl<T: Transport + 'static> Server<T> {
    /// Binds a new server to the configured address.
    pub async fn bind(
        config: &Config,
        resolver: Arc<Resolver<T>>,
    ) -> Result<Self, Error> {
        let sock = UdpSocket::bind((config.host(), config.port()))
            .await
            .map_err(|err| Error::Bind(Arc::new(err)))?;
        Ok(Server {
            sock: Arc::new(sock),
            resolver,
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.sock
            .local_addr()
            .map_err(|err| Error::LocalAddr(Arc::new(err)))
    }

    /// Returns a reference to the resolver.
    pub fn resolver(&self) -> &Arc<Resolver<T>> {
        &self.resolver
    }

    /// Serves requests.
    ///
    /// This never returns. Drop the future to stop the server.
    pub async fn run(&self) {
        loop {
            let mut buf = vec![0; RECV_SIZE];
            let (len, peer) = match self.sock.recv_from(&mut buf).await {
                Ok(some) => some,
                Err(err) => {
                    warn!("error receiving request: {err}");
                    continue;
                }
            };
            buf.truncate(len);
            let sock = self.sock.clone();
            let resolver = self.resolver.clone();
            tokio::spawn(async move {
                handle_request(&sock, &resolver, buf, peer).await
            });
        }
    }
}

/// Answers a single request.
async fn handle_request<T: Transport>(
    sock: &UdpSocket,
    resolver: &Resolver<T>,
    buf: Vec<u8>,
    peer: SocketAddr,
) {
    let request = match Message::from_octets(buf) {
        Ok(request) => request,
        Err(_) => {
            warn!("dropping short message from {peer}");
            return;
        }
    };

    if request.header().qr() {
        debug!("dropping response from {peer}");
        return;
    }

    let qname = request.first_question().map(|q| q.qname().to_vec());
    let reply = match qname {
        Some(qname) => {
            info!("query from {peer}: {qname}");
            let res = resolver.resolve(&qname).await;
            for addr in res.iter() {
                info!("{addr}");
            }
            compose_reply(&request, &qname, &res)
        }
        None => {
            debug!("request from {peer} without question");
            compose_error(&request, Rcode::FORMERR)
        }
    };

    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => {
            error!("failed to compose reply to {peer}: {err}");
            return;
        }
    };
    if let Err(err) = sock.send_to(&reply, peer).await {
        error!("failed to send reply to {peer}: {err}");
    }
}

//------------ Reply Composition ---------------------------------------------

/// Composes the reply to `request` carrying the addresses in `res`.
///
/// All records are owned by `qname` and have a TTL of 60 seconds.
pub fn compose_reply(
    request: &Message<Vec<u8>>,
    qname: &Name<Vec<u8>>,
    res: &ResultSet,
) -> Result<Vec<u8>, PushError> {
    let mut answer =
        MessageBuilder::new_vec().start_answer(request, Rcode::NOERROR)?;
    answer.header_mut().set_ra(true);
    let ttl = Ttl::from_secs(REPLY_TTL);
    for addr in res.iter() {
        match addr.addr() {
            IpAddr::V4(addr) => {
                answer.push((qname.clone(), Class::IN, ttl, A::new(addr)))?
            }
            IpAddr::V6(addr) => answer.push((
                qname.clone(),
                Class::IN,
                ttl,
                Aaaa::new(addr),
            ))?,
        }
    }
    Ok(answer.finish())
}

/// Composes an error reply to `request`.
pub fn compose_error(
    request: &Message<Vec<u8>>,
    rcode: Rcode,
) -> Result<Vec<u8>, PushError> {
    MessageBuilder::new_vec()
        .start_answer(request, rcode)
        .map(|answer| answer.finish())
}

//------------ Error ---------------------------------------------------------

/// An error preventing the server from running.
#[derive(Clone, Debug)]
pub enum Error {
    /// Binding the listening socket failed.
    Bind(Arc<std::io::Error>),

    /// The address of the listening socket could not be determined.
    LocalAddr(Arc<std::io::Error>),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind(_) => write!(f, "error binding socket"),
            Error::LocalAddr(_) => write!(f, "error getting local address"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bind(err) | Error::LocalAddr(err) => Some(err.as_ref()),
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::Address;
    use domain::base::iana::Rtype;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn request(qname: &Name<Vec<u8>>) -> Message<Vec<u8>> {
        let mut msg = MessageBuilder::new_vec();
        msg.header_mut().set_id(4711);
        msg.header_mut().set_rd(true);
        let mut msg = msg.question();
        msg.push((qname.clone(), Rtype::A)).unwrap();
        msg.into_message()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 5354);
        assert_eq!(config.to_string(), "localhost:5354");
    }

    #[test]
    fn reply_carries_all_addresses() {
        let qname = Name::vec_from_str("www.example.com").unwrap();
        let target = Name::vec_from_str("example.com").unwrap();
        let res = ResultSet::from_parts(
            vec![Address::new(
                target.clone(),
                Ipv4Addr::new(192, 0, 2, 1).into(),
            )],
            vec![Address::new(target, Ipv6Addr::LOCALHOST.into())],
        );
        let reply = compose_reply(&request(&qname), &qname, &res).unwrap();
        let reply = Message::from_octets(reply).unwrap();

        assert_eq!(reply.header().id(), 4711);
        assert!(reply.header().qr());
        assert_eq!(reply.header().rcode(), Rcode::NOERROR);
        let records = reply
            .answer()
            .unwrap()
            .map(|record| record.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rtype(), Rtype::A);
        assert_eq!(records[1].rtype(), Rtype::AAAA);
        for record in records {
            assert_eq!(record.owner().to_vec(), qname);
            assert_eq!(record.ttl(), Ttl::from_secs(60));
        }
    }

    #[test]
    fn error_leaves_cause_to_source() {
        use std::error::Error as _;

        let err = Error::Bind(Arc::new(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        )));
        assert_eq!(err.to_string(), "error binding socket");
        assert_eq!(err.source().unwrap().to_string(), "address in use");
    }

    #[test]
    fn error_reply() {
        let msg = MessageBuilder::new_vec().into_message();
        let reply =
            Message::from_octets(compose_error(&msg, Rcode::FORMERR).unwrap())
                .unwrap();
        assert_eq!(reply.header().rcode(), Rcode::FORMERR);
        assert_eq!(reply.header_counts().ancount(), 0);
    }
}
