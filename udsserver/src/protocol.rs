// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Requests and responses of the control-plane protocol.
//!
//! Requests are short text messages: a verb, optionally followed by
//! comma separated arguments (`/xsk_map_fd, ens1f0sf1`). Parsing is strict;
//! anything that is not exactly a known verb with the expected number of
//! well-formed arguments is rejected.

use std::num::ParseIntError;
use std::str::FromStr;

/// Version string sent in reply to `/version`
pub const PROTOCOL_VERSION: &str = "0.1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Verb {
    #[strum(serialize = "/connect")]
    Connect,
    #[strum(serialize = "/xsk_map_fd")]
    XskMapFd,
    #[strum(serialize = "/version")]
    Version,
    #[strum(serialize = "/config_busy_poll")]
    BusyPoll,
    #[strum(serialize = "/fin")]
    Fin,
}

/// A well-formed request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// `/connect, <pod>`
    Connect(String),
    /// `/xsk_map_fd, <device>`
    XskMapFd(String),
    /// `/version`
    Version,
    /// `/config_busy_poll, <timeout>, <budget>`, with a socket descriptor attached
    BusyPoll { timeout: String, budget: String },
    /// `/fin`
    Fin,
}

impl Request {
    #[must_use]
    pub fn verb(&self) -> Verb {
        match self {
            Request::Connect(_) => Verb::Connect,
            Request::XskMapFd(_) => Verb::XskMapFd,
            Request::Version => Verb::Version,
            Request::BusyPoll { .. } => Verb::BusyPoll,
            Request::Fin => Verb::Fin,
        }
    }
}

/// Ways a request can be malformed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("request does not fit the receive buffer")]
    TooLong,
    #[error("request is not valid text")]
    NotText,
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    #[error("{verb} takes {expected} arguments, got {got}")]
    Arguments {
        verb: Verb,
        expected: usize,
        got: usize,
    },
    #[error("invalid argument {0:?}")]
    Argument(String),
}

/// Replies of the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    HostOk,
    HostNak,
    FdAck,
    FdNak,
    /// [`PROTOCOL_VERSION`]
    Version,
    BusyPollAck,
    BusyPollNak,
    FinAck,
    Nak,
    Error,
}

impl Response {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Response::HostOk => "/host_ok",
            Response::HostNak => "/host_nak",
            Response::FdAck => "/fd_ack",
            Response::FdNak => "/fd_nak",
            Response::Version => PROTOCOL_VERSION,
            Response::BusyPollAck => "/config_busy_poll_ack",
            Response::BusyPollNak => "/config_busy_poll_nak",
            Response::FinAck => "/fin_ack",
            Response::Nak => "/nak",
            Response::Error => "/error",
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl AsRef<str> for Response {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// An argument with its surrounding spaces removed. It must be a non empty
/// run of `[A-Za-z0-9._-]`.
fn token(arg: &str) -> Result<String, RequestError> {
    let trimmed = arg.trim_matches(' ');
    if trimmed.is_empty() || !trimmed.chars().all(is_token_char) {
        return Err(RequestError::Argument(arg.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn arguments(verb: Verb, expected: usize, args: &[&str]) -> Result<Vec<String>, RequestError> {
    if args.len() != expected {
        return Err(RequestError::Arguments {
            verb,
            expected,
            got: args.len(),
        });
    }
    args.iter().map(|arg| token(arg)).collect()
}

/// Parse one received message. `truncated` tells if the message was cut.
pub fn parse(payload: &[u8], truncated: bool) -> Result<Request, RequestError> {
    if truncated {
        return Err(RequestError::TooLong);
    }
    let text = std::str::from_utf8(payload).map_err(|_| RequestError::NotText)?;
    let mut parts = text.split(',');
    let verb = parts.next().unwrap_or_default();
    let verb = Verb::from_str(verb).map_err(|_| RequestError::UnknownVerb(verb.to_owned()))?;
    let args: Vec<&str> = parts.collect();
    let request = match verb {
        Verb::Connect => {
            let mut args = arguments(verb, 1, &args)?;
            Request::Connect(args.remove(0))
        }
        Verb::XskMapFd => {
            let mut args = arguments(verb, 1, &args)?;
            Request::XskMapFd(args.remove(0))
        }
        Verb::Version => {
            arguments(verb, 0, &args)?;
            Request::Version
        }
        Verb::BusyPoll => {
            let mut args = arguments(verb, 2, &args)?.into_iter();
            match (args.next(), args.next()) {
                (Some(timeout), Some(budget)) => Request::BusyPoll { timeout, budget },
                _ => {
                    return Err(RequestError::Arguments {
                        verb,
                        expected: 2,
                        got: 0,
                    });
                }
            }
        }
        Verb::Fin => {
            arguments(verb, 0, &args)?;
            Request::Fin
        }
    };
    Ok(request)
}

/// The numeric values of a busy poll request
pub fn busy_poll_values(timeout: &str, budget: &str) -> Result<(i32, i32), ParseIntError> {
    Ok((timeout.parse()?, budget.parse()?))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_str(text: &str) -> Result<Request, RequestError> {
        parse(text.as_bytes(), false)
    }

    #[test]
    fn well_formed_requests() {
        assert_eq!(parse_str("/connect, podA"), Ok(Request::Connect("podA".to_owned())));
        assert_eq!(parse_str("/connect,podA"), Ok(Request::Connect("podA".to_owned())));
        assert_eq!(
            parse_str("/xsk_map_fd, ens1f0sf1"),
            Ok(Request::XskMapFd("ens1f0sf1".to_owned()))
        );
        assert_eq!(parse_str("/version"), Ok(Request::Version));
        assert_eq!(
            parse_str("/config_busy_poll, 20, 64"),
            Ok(Request::BusyPoll {
                timeout: "20".to_owned(),
                budget: "64".to_owned()
            })
        );
        assert_eq!(parse_str("/fin"), Ok(Request::Fin));
    }

    #[test]
    fn noise_is_rejected() {
        assert_eq!(
            parse_str("/connect, podA\0"),
            Err(RequestError::Argument(" podA\0".to_owned()))
        );
        assert_eq!(
            parse_str("garbage/connect, podA"),
            Err(RequestError::UnknownVerb("garbage/connect".to_owned()))
        );
        assert_eq!(
            parse_str("/connect, podA, podB"),
            Err(RequestError::Arguments {
                verb: Verb::Connect,
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            parse_str(" /connect, podA"),
            Err(RequestError::UnknownVerb(" /connect".to_owned()))
        );
        assert_eq!(
            parse_str("/connect, pod A"),
            Err(RequestError::Argument(" pod A".to_owned()))
        );
        assert_eq!(
            parse_str("/connect, "),
            Err(RequestError::Argument(" ".to_owned()))
        );
        assert_eq!(
            parse_str("/version, 1"),
            Err(RequestError::Arguments {
                verb: Verb::Version,
                expected: 0,
                got: 1
            })
        );
        assert_eq!(
            parse_str("/fin\n"),
            Err(RequestError::UnknownVerb("/fin\n".to_owned()))
        );
        assert_eq!(
            parse_str("/config_busy_poll, 20"),
            Err(RequestError::Arguments {
                verb: Verb::BusyPoll,
                expected: 2,
                got: 1
            })
        );
        assert_eq!(parse(b"/fin", true), Err(RequestError::TooLong));
        assert_eq!(parse(b"/fin\xff", false), Err(RequestError::NotText));
    }

    #[test]
    fn busy_poll_values_must_be_numbers() {
        assert_eq!(busy_poll_values("20", "64"), Ok((20, 64)));
        assert_eq!(busy_poll_values("-1", "0"), Ok((-1, 0)));
        assert!(busy_poll_values("abc", "64").is_err());
        assert!(busy_poll_values("20", "99999999999").is_err());
    }

    #[test]
    fn responses() {
        assert_eq!(Response::HostOk.as_bytes(), b"/host_ok");
        assert_eq!(Response::Version.as_str(), PROTOCOL_VERSION);
        assert_eq!(Response::Version.to_string(), PROTOCOL_VERSION);
        assert_eq!(Response::Nak.to_string(), "/nak");
        assert_eq!(Response::BusyPollNak.as_ref(), "/config_busy_poll_nak");
    }

    #[test]
    fn parse_never_accepts_noise() {
        bolero::check!().for_each(|bytes: &[u8]| {
            let Ok(request) = parse(bytes, false) else {
                return;
            };
            let Ok(text) = std::str::from_utf8(bytes) else {
                panic!("accepted non text request {bytes:?}");
            };
            assert!(text.starts_with(&request.verb().to_string()));
            let args = match &request {
                Request::Connect(arg) | Request::XskMapFd(arg) => vec![arg.as_str()],
                Request::BusyPoll { timeout, budget } => vec![timeout.as_str(), budget.as_str()],
                Request::Version | Request::Fin => vec![],
            };
            assert_eq!(text.matches(',').count(), args.len());
            for arg in args {
                assert!(!arg.is_empty());
                assert!(arg.chars().all(is_token_char), "bad argument {arg:?}");
            }
        });
    }

    #[test]
    fn connect_requests_round_trip() {
        bolero::check!()
            .with_type::<(String, u8, u8)>()
            .for_each(|(pod, lead, trail)| {
                let text = format!(
                    "/connect,{}{pod}{}",
                    " ".repeat(usize::from(lead % 4)),
                    " ".repeat(usize::from(trail % 4))
                );
                let expected = pod.trim_matches(' ');
                let valid = !expected.is_empty() && expected.chars().all(is_token_char);
                match parse_str(&text) {
                    Ok(Request::Connect(parsed)) => {
                        assert!(valid);
                        assert_eq!(parsed, expected);
                    }
                    Ok(other) => panic!("unexpected request {other:?}"),
                    Err(_) => assert!(!valid),
                }
            });
    }
}
