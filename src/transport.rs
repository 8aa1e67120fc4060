//! Sending queries to name servers.
//!
//! The resolver talks to name servers through the [`Transport`] trait. A
//! transport sends a single question to a single server and hands back the
//! [`Response`] or an [`Error`]. It does not retry and does not try other
//! servers, this is left to the resolver.
//!
//! [`UdpTransport`] is the transport used in production. It sends each
//! query from a fresh UDP socket and waits for a matching reply until the
//! configured timeout expires.

#![warn(missing_docs)]

use crate::response::Response;
use crate::utils::config::DefMinMax;
use domain::base::iana::{Rcode, Rtype};
use domain::base::name::Name;
use domain::base::{Message, MessageBuilder};
use std::error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the time to wait for a reply.
const TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(3),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

/// The port name servers listen on.
const DEF_PORT: u16 = 53;

/// Size of the receive buffer.
///
/// We don’t do EDNS, so 512 would do. But some servers send larger
/// datagrams anyway and we’d rather parse them than fail.
const RECV_SIZE: usize = 4096;

//------------ Transport -----------------------------------------------------

/// A way to ask a name server a question.
pub trait Transport: Send + Sync {
    /// Asks `server` for the records of type `qtype` at `qname`.
    ///
    /// The returned future resolves into the response or an error if no
    /// usable response was received.
    fn query<'a>(
        &'a self,
        qname: &'a Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn query<'a>(
        &'a self,
        qname: &'a Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>
    {
        T::query(self.as_ref(), qname, qtype, server)
    }
}

//------------ Config --------------------------------------------------------

/// Configuration for a UDP transport.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long to wait for a reply.
    timeout: Duration,

    /// The destination port.
    port: u16,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the timeout.
    ///
    /// This is the maximum amount of time to wait for a reply after the
    /// query was sent.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the timeout.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_timeout(&mut self, value: Duration) {
        self.timeout = TIMEOUT.limit(value)
    }

    /// Returns the destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sets the destination port.
    ///
    /// Only useful for talking to test servers.
    pub fn set_port(&mut self, value: u16) {
        self.port = value
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT.default(),
            port: DEF_PORT,
        }
    }
}

//------------ UdpTransport --------------------------------------------------

/// A transport sending queries over UDP.
#[derive(Clone, Debug, Default)]
pub struct UdpTransport {
    /// The configuration.
    config: Config,
}

impl UdpTransport {
    /// Creates a new transport with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new transport with the given configuration.
    pub fn with_config(config: Config) -> Self {
        UdpTransport { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the query message.
    fn create_message(
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
    ) -> Result<Message<Vec<u8>>, Error> {
        let mut msg = MessageBuilder::new_vec();
        msg.header_mut().set_random_id();
        msg.header_mut().set_rd(true);
        let mut msg = msg.question();
        msg.push((qname.clone(), qtype)).map_err(|_| Error::Build)?;
        Ok(msg.into_message())
    }

    /// Performs a single exchange.
    async fn exchange(
        &self,
        qname: &Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Result<Response, Error> {
        let request = Self::create_message(qname, qtype)?;
        let deadline = Instant::now() + self.config.timeout;

        let local: SocketAddr = match server {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let sock = UdpSocket::bind(local)
            .await
            .map_err(|err| Error::Bind(Arc::new(err)))?;
        sock.connect((server, self.config.port))
            .await
            .map_err(|err| Error::Connect(Arc::new(err)))?;

        let dgram = request.as_slice();
        let sent = sock
            .send(dgram)
            .await
            .map_err(|err| Error::Send(Arc::new(err)))?;
        if sent != dgram.len() {
            return Err(Error::ShortSend);
        }
        trace!("sent {qname} {qtype} to {server}");

        loop {
            let mut buf = vec![0; RECV_SIZE];
            let len = match timeout_at(deadline, sock.recv(&mut buf)).await {
                Ok(res) => res.map_err(|err| Error::Receive(Arc::new(err)))?,
                Err(_) => return Err(Error::Timeout),
            };
            buf.truncate(len);

            // Garbage and stray replies are dropped. The deadline bounds
            // how long we keep listening.
            let reply = match Message::from_octets(buf) {
                Ok(reply) => reply,
                Err(_) => {
                    trace!("dropping short message from {server}");
                    continue;
                }
            };
            if !is_answer(&reply, &request) {
                trace!("dropping unrelated message from {server}");
                continue;
            }
            return Response::from_message(&reply).map_err(|_| Error::Parse);
        }
    }
}

impl Transport for UdpTransport {
    fn query<'a>(
        &'a self,
        qname: &'a Name<Vec<u8>>,
        qtype: Rtype,
        server: IpAddr,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>
    {
        Box::pin(self.exchange(qname, qtype, server))
    }
}

//------------ Utility -------------------------------------------------------

/// Checks whether a message is a reply to a query.
///
/// A truncated or error reply may come without a question section. In all
/// other cases the question has to match.
fn is_answer(reply: &Message<Vec<u8>>, query: &Message<Vec<u8>>) -> bool {
    let header = reply.header();
    if !header.qr() || header.id() != query.header().id() {
        return false;
    }
    let counts = reply.header_counts();
    if (header.tc() || header.rcode() != Rcode::NOERROR)
        && counts.qdcount() == 0
    {
        return true;
    }
    counts.qdcount() == query.header_counts().qdcount()
        && reply.first_question() == query.first_question()
}

//------------ Error ---------------------------------------------------------

/// A query did not produce a usable response.
#[derive(Clone, Debug)]
pub enum Error {
    /// The query message could not be built.
    Build,

    /// Binding a UDP socket gave an error.
    Bind(Arc<std::io::Error>),

    /// Connecting a UDP socket gave an error.
    Connect(Arc<std::io::Error>),

    /// Sending over a UDP socket gave an error.
    Send(Arc<std::io::Error>),

    /// Sending over a UDP socket gave a partial result.
    ShortSend,

    /// Receiving from a UDP socket gave an error.
    Receive(Arc<std::io::Error>),

    /// No reply arrived in time.
    Timeout,

    /// The reply could not be parsed.
    Parse,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Build => write!(f, "failed to build query message"),
            Error::Bind(_) => write!(f, "error binding UDP socket"),
            Error::Connect(_) => write!(f, "error connecting UDP socket"),
            Error::Send(_) => write!(f, "error sending to UDP socket"),
            Error::ShortSend => write!(f, "partial send to UDP socket"),
            Error::Receive(_) => {
                write!(f, "error receiving from UDP socket")
            }
            Error::Timeout => write!(f, "timeout waiting for response"),
            Error::Parse => write!(f, "malformed response"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bind(e)
            | Error::Connect(e)
            | Error::Send(e)
            | Error::Receive(e) => Some(e.as_ref()),
            Error::Build | Error::ShortSend | Error::Timeout | Error::Parse => {
                None
            }
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::name::ToName;
    use domain::base::Ttl;
    use domain::rdata::A;

    /// Runs a one-shot name server on a loopback socket.
    ///
    /// The server first sends `noise` datagrams that must be ignored and
    /// then a proper answer with a single A record.
    async fn one_shot_server(noise: Vec<Vec<u8>>) -> u16 {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = vec![0; 512];
            let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
            buf.truncate(len);
            let request = Message::from_octets(buf).unwrap();
            for dgram in noise {
                sock.send_to(&dgram, peer).await.unwrap();
            }
            let qname = request.first_question().unwrap().qname().to_vec();
            let mut answer = MessageBuilder::new_vec()
                .start_answer(&request, Rcode::NOERROR)
                .unwrap();
            answer
                .push((
                    qname,
                    Class::IN,
                    Ttl::from_secs(300),
                    A::new(Ipv4Addr::new(192, 0, 2, 1)),
                ))
                .unwrap();
            sock.send_to(&answer.finish(), peer).await.unwrap();
        });
        port
    }

    fn transport(port: u16, timeout: Duration) -> UdpTransport {
        let mut config = Config::new();
        config.set_port(port);
        config.set_timeout(timeout);
        UdpTransport::with_config(config)
    }

    #[test]
    fn config_limits() {
        let mut config = Config::new();
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.port(), 53);
        config.set_timeout(Duration::from_secs(3600));
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn exchange_skips_garbage() {
        let stray = {
            let mut msg = MessageBuilder::new_vec();
            msg.header_mut().set_qr(true);
            msg.header_mut().set_id(0);
            msg.finish()
        };
        let port = one_shot_server(vec![vec![1, 2, 3], stray]).await;
        let qname = Name::vec_from_str("www.example.com").unwrap();
        let response = transport(port, Duration::from_secs(2))
            .query(&qname, Rtype::A, Ipv4Addr::LOCALHOST.into())
            .await
            .unwrap();
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].owner(), &qname);
    }

    #[tokio::test]
    async fn exchange_times_out() {
        // Bound but silent.
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sock.local_addr().unwrap().port();
        let qname = Name::vec_from_str("www.example.com").unwrap();
        let res = transport(port, Duration::from_millis(50))
            .query(&qname, Rtype::A, Ipv4Addr::LOCALHOST.into())
            .await;
        assert!(matches!(res, Err(Error::Timeout)));
        drop(sock);
    }
}
