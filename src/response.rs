//! The resolver's view of a DNS response.
//!
//! The resolution engine only ever looks at two sections of a response,
//! the answer section and the additional section, and only cares about
//! three record types: A, AAAA, and CNAME. This module provides a small
//! owned model of exactly that, [`Response`], together with the conversion
//! from a wire-format [`Message`].
//!
//! Keeping the model independent of the wire format means the resolver can
//! be driven by any [`Transport`][crate::transport::Transport], including
//! the scripted ones used in tests.

use crate::transport::Error;
use domain::base::iana::Rtype;
use domain::base::name::{Name, ParsedName, ToName};
use domain::base::wire::ParseError;
use domain::base::{Message, ParsedRecord};
use domain::rdata::{Aaaa, Cname, A};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

//------------ Response ------------------------------------------------------

/// The answer and additional sections of a DNS response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Response {
    /// The records of the answer section in message order.
    answers: Vec<Entry>,

    /// The records of the additional section in message order.
    additional: Vec<Entry>,
}

impl Response {
    /// Creates a response from its two sections.
    pub fn new(answers: Vec<Entry>, additional: Vec<Entry>) -> Self {
        Response {
            answers,
            additional,
        }
    }

    /// Creates a response with neither answers nor additional records.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Converts a parsed DNS message.
    ///
    /// The authority section is skipped. Records of types other than A,
    /// AAAA, and CNAME are kept as [`RecordData::Other`] so that the
    /// sections keep their length.
    pub fn from_message(msg: &Message<Vec<u8>>) -> Result<Self, ParseError> {
        let mut answers = Vec::new();
        for record in msg.answer()? {
            answers.push(Entry::from_record(record?)?);
        }
        let mut additional = Vec::new();
        for record in msg.additional()? {
            additional.push(Entry::from_record(record?)?);
        }
        Ok(Response {
            answers,
            additional,
        })
    }

    /// Returns the answer section.
    pub fn answers(&self) -> &[Entry] {
        &self.answers
    }

    /// Returns the additional section.
    pub fn additional(&self) -> &[Entry] {
        &self.additional
    }

    /// Returns whether the answer section holds at least one record.
    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    /// Returns whether the additional section holds at least one record.
    pub fn has_additional(&self) -> bool {
        !self.additional.is_empty()
    }

    /// Returns the target of the first CNAME record in the answer section.
    pub fn alias_target(&self) -> Option<&Name<Vec<u8>>> {
        self.answers.iter().find_map(|entry| match entry.data() {
            RecordData::Cname(target) => Some(target),
            _ => None,
        })
    }

    /// Returns an iterator over the IPv4 glue addresses.
    ///
    /// These are the addresses of all A records in the additional section
    /// in message order. AAAA glue is not used.
    pub fn glue(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.additional.iter().filter_map(|entry| match entry.data() {
            RecordData::A(addr) => Some(*addr),
            _ => None,
        })
    }
}

//------------ Entry ---------------------------------------------------------

/// A single resource record of a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// The owner name of the record.
    owner: Name<Vec<u8>>,

    /// The record data.
    data: RecordData,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(owner: Name<Vec<u8>>, data: RecordData) -> Self {
        Entry { owner, data }
    }

    /// Creates an A record entry.
    pub fn a(owner: Name<Vec<u8>>, addr: Ipv4Addr) -> Self {
        Self::new(owner, RecordData::A(addr))
    }

    /// Creates an AAAA record entry.
    pub fn aaaa(owner: Name<Vec<u8>>, addr: Ipv6Addr) -> Self {
        Self::new(owner, RecordData::Aaaa(addr))
    }

    /// Creates a CNAME record entry.
    pub fn cname(owner: Name<Vec<u8>>, target: Name<Vec<u8>>) -> Self {
        Self::new(owner, RecordData::Cname(target))
    }

    /// Converts a record parsed out of a message.
    fn from_record(
        record: ParsedRecord<'_, Vec<u8>>,
    ) -> Result<Self, ParseError> {
        let owner = record.owner().to_vec();
        let rtype = record.rtype();
        let data = if rtype == Rtype::A {
            record
                .into_record::<A>()?
                .map(|record| RecordData::A(record.data().addr()))
        } else if rtype == Rtype::AAAA {
            record
                .into_record::<Aaaa>()?
                .map(|record| RecordData::Aaaa(record.data().addr()))
        } else if rtype == Rtype::CNAME {
            record
                .into_record::<Cname<ParsedName<_>>>()?
                .map(|record| RecordData::Cname(record.data().cname().to_vec()))
        } else {
            None
        };
        Ok(Entry {
            owner,
            data: data.unwrap_or(RecordData::Other(rtype)),
        })
    }

    /// Returns the owner name of the record.
    pub fn owner(&self) -> &Name<Vec<u8>> {
        &self.owner
    }

    /// Returns the record data.
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Returns the record type.
    pub fn rtype(&self) -> Rtype {
        self.data.rtype()
    }
}

//--- Display

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.owner, self.rtype(), self.data)
    }
}

//------------ RecordData ----------------------------------------------------

/// The data of the record types the resolver understands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordData {
    /// An IPv4 host address.
    A(Ipv4Addr),

    /// An IPv6 host address.
    Aaaa(Ipv6Addr),

    /// The canonical name for an alias.
    Cname(Name<Vec<u8>>),

    /// Any other record type. Its data is dropped.
    Other(Rtype),
}

impl RecordData {
    /// Returns the record type of the data.
    pub fn rtype(&self) -> Rtype {
        match self {
            RecordData::A(_) => Rtype::A,
            RecordData::Aaaa(_) => Rtype::AAAA,
            RecordData::Cname(_) => Rtype::CNAME,
            RecordData::Other(rtype) => *rtype,
        }
    }
}

//--- Display

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordData::A(addr) => addr.fmt(f),
            RecordData::Aaaa(addr) => addr.fmt(f),
            RecordData::Cname(target) => target.fmt(f),
            RecordData::Other(_) => f.write_str("..."),
        }
    }
}

//------------ Reply ---------------------------------------------------------

/// The outcome of a single exchange with a name server.
///
/// A failed exchange is kept apart from a response that simply has no
/// records so that failures can be reported. For the purpose of resolution
/// both mean that the server had nothing to offer.
#[derive(Clone, Debug)]
pub enum Reply {
    /// The server responded.
    Message(Response),

    /// There was no usable response.
    Failed(Error),
}

impl Reply {
    /// Returns the response if there was one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Reply::Message(response) => Some(response),
            Reply::Failed(_) => None,
        }
    }

    /// Converts the reply into the response if there was one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Reply::Message(response) => Some(response),
            Reply::Failed(_) => None,
        }
    }

    /// Returns whether the exchange failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Reply::Failed(_))
    }
}

impl From<Result<Response, Error>> for Reply {
    fn from(res: Result<Response, Error>) -> Self {
        match res {
            Ok(response) => Reply::Message(response),
            Err(err) => Reply::Failed(err),
        }
    }
}

//============ Testing =======================================================
