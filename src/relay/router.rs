//! Session routing.
//!
//! Classifies an inbound HTTP request into one of five intents by matching
//! its method and path against configured templates.
//!
//! # Routing Table (default templates)
//!
//! | Method | Path | Intent |
//! |--------|------|--------|
//! | `POST` | `/sessions/[session]/[protocols]` | Create a session |
//! | `POST` | `/sessions/[session]/responder/requests/[protocols]` | Relay to responder |
//! | `POST` | `/sessions/[session]/initiator/requests/[protocols]` | Relay to initiator |
//! | `GET` | `/sessions/[session]/responder` | Describe responder |
//! | `GET` | `/sessions/[session]/initiator` | Describe initiator |
//!
//! Templates are checked in the order above; the first match wins.
//!
//! # Templates
//!
//! A template is parsed once into literal and placeholder pieces. A
//! placeholder matches one or more characters other than `/`; the match is
//! anchored to the whole path. `[protocols]` is percent-decoded and split on
//! `,`; `[session]` is taken verbatim.

use std::fmt;

use axum::body::Body;
use axum::extract::Request;
use http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::store::SessionResponder;

/// The five things a relay request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteKind {
    CreateSession,
    RelayResponderRequest,
    GetResponder,
    RelayInitiatorRequest,
    GetInitiator,
}

impl RouteKind {
    /// Order in which templates are tried.
    pub const MATCH_ORDER: [RouteKind; 5] = [
        RouteKind::CreateSession,
        RouteKind::RelayResponderRequest,
        RouteKind::RelayInitiatorRequest,
        RouteKind::GetResponder,
        RouteKind::GetInitiator,
    ];

    /// Order in which routes are advertised.
    pub const LISTING_ORDER: [RouteKind; 5] = [
        RouteKind::CreateSession,
        RouteKind::RelayResponderRequest,
        RouteKind::GetResponder,
        RouteKind::RelayInitiatorRequest,
        RouteKind::GetInitiator,
    ];

    pub fn method(&self) -> Method {
        match self {
            RouteKind::GetResponder | RouteKind::GetInitiator => Method::GET,
            _ => Method::POST,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            RouteKind::GetResponder | RouteKind::GetInitiator => "GET",
            _ => "POST",
        }
    }

    /// Position in [`RouteKind::MATCH_ORDER`].
    fn match_index(&self) -> usize {
        match self {
            RouteKind::CreateSession => 0,
            RouteKind::RelayResponderRequest => 1,
            RouteKind::RelayInitiatorRequest => 2,
            RouteKind::GetResponder => 3,
            RouteKind::GetInitiator => 4,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RouteKind::CreateSession => "Create a session",
            RouteKind::RelayResponderRequest => "Relay a request to a session's responder",
            RouteKind::GetResponder => {
                "Get a session's responder. Result type: { url: string, protocols: string[] }"
            }
            RouteKind::RelayInitiatorRequest => "Relay a request to a session's initiator",
            RouteKind::GetInitiator => {
                "Get a session's initiator. Result type: { protocols: string[] }"
            }
        }
    }

    /// Whether the template must carry `[protocols]`.
    pub fn takes_protocols(&self) -> bool {
        self.method() == Method::POST
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::CreateSession => "createSession",
            RouteKind::RelayResponderRequest => "relayResponderRequest",
            RouteKind::GetResponder => "getResponder",
            RouteKind::RelayInitiatorRequest => "relayInitiatorRequest",
            RouteKind::GetInitiator => "getInitiator",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path templates for the five intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct RouteTable {
    pub create_session: String,
    pub relay_responder_request: String,
    pub get_responder: String,
    pub relay_initiator_request: String,
    pub get_initiator: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            create_session: "/sessions/[session]/[protocols]".to_string(),
            relay_responder_request: "/sessions/[session]/responder/requests/[protocols]"
                .to_string(),
            get_responder: "/sessions/[session]/responder".to_string(),
            relay_initiator_request: "/sessions/[session]/initiator/requests/[protocols]"
                .to_string(),
            get_initiator: "/sessions/[session]/initiator".to_string(),
        }
    }
}

impl RouteTable {
    pub fn template(&self, kind: RouteKind) -> &str {
        match kind {
            RouteKind::CreateSession => &self.create_session,
            RouteKind::RelayResponderRequest => &self.relay_responder_request,
            RouteKind::GetResponder => &self.get_responder,
            RouteKind::RelayInitiatorRequest => &self.relay_initiator_request,
            RouteKind::GetInitiator => &self.get_initiator,
        }
    }
}

/// Template validation failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteConfigError {
    #[error("template '{template}' uses unknown placeholder '[{name}]'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("template '{template}' has an unterminated placeholder")]
    UnterminatedPlaceholder { template: String },

    #[error("template '{template}' repeats placeholder '[{name}]'")]
    DuplicatePlaceholder { template: String, name: String },

    #[error("{kind} template '{template}' is missing placeholder '[{name}]'")]
    MissingPlaceholder {
        kind: RouteKind,
        template: String,
        name: &'static str,
    },

    #[error("{kind} template '{template}' must not use placeholder '[{name}]'")]
    UnexpectedPlaceholder {
        kind: RouteKind,
        template: String,
        name: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Session,
    Protocols,
}

impl Piece {
    fn placeholder_name(&self) -> Option<&'static str> {
        match self {
            Piece::Literal(_) => None,
            Piece::Session => Some("session"),
            Piece::Protocols => Some("protocols"),
        }
    }
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    source: String,
    pieces: Vec<Piece>,
}

/// Raw placeholder captures of a matched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Captures<'p> {
    pub session: Option<&'p str>,
    pub protocols: Option<&'p str>,
}

impl RouteTemplate {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// Unknown, unterminated, or repeated placeholders.
    pub fn parse(template: &str) -> Result<Self, RouteConfigError> {
        let mut pieces = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('[') {
            if open > 0 {
                pieces.push(Piece::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find(']')
                .ok_or_else(|| RouteConfigError::UnterminatedPlaceholder {
                    template: template.to_string(),
                })?;
            let piece = match &after[..close] {
                "session" => Piece::Session,
                "protocols" => Piece::Protocols,
                other => {
                    return Err(RouteConfigError::UnknownPlaceholder {
                        template: template.to_string(),
                        name: other.to_string(),
                    });
                }
            };
            if pieces.contains(&piece) {
                return Err(RouteConfigError::DuplicatePlaceholder {
                    template: template.to_string(),
                    name: piece.placeholder_name().unwrap_or_default().to_string(),
                });
            }
            pieces.push(piece);
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest.to_string()));
        }

        Ok(Self {
            source: template.to_string(),
            pieces,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn has_session(&self) -> bool {
        self.pieces.contains(&Piece::Session)
    }

    pub fn has_protocols(&self) -> bool {
        self.pieces.contains(&Piece::Protocols)
    }

    /// Match `path` against the whole template.
    pub fn matches<'p>(&self, path: &'p str) -> Option<Captures<'p>> {
        let mut captured = Vec::with_capacity(2);
        if !match_pieces(&self.pieces, path, &mut captured) {
            return None;
        }

        let mut captures = Captures {
            session: None,
            protocols: None,
        };
        let placeholders = self.pieces.iter().filter(|p| !matches!(p, Piece::Literal(_)));
        for (piece, value) in placeholders.zip(captured) {
            match piece {
                Piece::Session => captures.session = Some(value),
                Piece::Protocols => captures.protocols = Some(value),
                Piece::Literal(_) => {}
            }
        }
        Some(captures)
    }

    /// Produce a concrete path for `session` and `protocols`.
    ///
    /// The protocol list is joined with `,` and percent-encoded; the session
    /// is inserted verbatim.
    pub fn render(&self, session: &str, protocols: &[String]) -> String {
        let mut path = String::with_capacity(self.source.len() + session.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => path.push_str(text),
                Piece::Session => path.push_str(session),
                Piece::Protocols => path.push_str(&urlencoding::encode(&protocols.join(","))),
            }
        }
        path
    }
}

/// Backtracking matcher; placeholders try the longest segment first.
fn match_pieces<'p>(pieces: &[Piece], path: &'p str, captured: &mut Vec<&'p str>) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return path.is_empty();
    };

    match first {
        Piece::Literal(text) => path
            .strip_prefix(text.as_str())
            .is_some_and(|tail| match_pieces(rest, tail, captured)),
        Piece::Session | Piece::Protocols => {
            let limit = path.find('/').unwrap_or(path.len());
            for end in (1..=limit).rev() {
                if !path.is_char_boundary(end) {
                    continue;
                }
                captured.push(&path[..end]);
                if match_pieces(rest, &path[end..], captured) {
                    return true;
                }
                captured.pop();
            }
            false
        }
    }
}

/// A supported route as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedRoute {
    #[serde(rename = "type")]
    pub kind: RouteKind,
    pub method: &'static str,
    pub path: String,
    pub description: &'static str,
}

/// Routing failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    /// No template matched the request.
    #[error("Invalid route: {method} {path}")]
    InvalidRoute {
        method: String,
        path: String,
        routes: Vec<SupportedRoute>,
    },

    /// The create-session body is not an absolute URL.
    #[error("Invalid responder URL '{value}': {reason}")]
    InvalidResponderUrl { value: String, reason: String },

    /// `[protocols]` did not percent-decode to UTF-8.
    #[error("Invalid protocols segment '{raw}'")]
    InvalidProtocols { raw: String },

    /// The request body could not be read.
    #[error("Failed to read request body: {reason}")]
    UnreadableBody { reason: String },
}

/// Classification of a method and path, before the body is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub kind: RouteKind,
    pub session_id: String,
    pub protocols: Vec<String>,
}

/// A fully resolved route, owning whatever it needs to be acted on.
#[derive(Debug)]
pub enum Route {
    CreateSession {
        session_id: String,
        responder: SessionResponder,
    },
    RelayResponderRequest {
        session_id: String,
        protocols: Vec<String>,
        request: Request,
    },
    GetResponder {
        session_id: String,
    },
    RelayInitiatorRequest {
        session_id: String,
        protocols: Vec<String>,
        request: Request,
    },
    GetInitiator {
        session_id: String,
    },
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self {
            Route::CreateSession { .. } => RouteKind::CreateSession,
            Route::RelayResponderRequest { .. } => RouteKind::RelayResponderRequest,
            Route::GetResponder { .. } => RouteKind::GetResponder,
            Route::RelayInitiatorRequest { .. } => RouteKind::RelayInitiatorRequest,
            Route::GetInitiator { .. } => RouteKind::GetInitiator,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Route::CreateSession { session_id, .. }
            | Route::RelayResponderRequest { session_id, .. }
            | Route::GetResponder { session_id }
            | Route::RelayInitiatorRequest { session_id, .. }
            | Route::GetInitiator { session_id } => session_id,
        }
    }
}

/// Compiled route table.
#[derive(Debug, Clone)]
pub struct SessionRouter {
    templates: Vec<(RouteKind, RouteTemplate)>,
    body_limit: usize,
}

impl SessionRouter {
    /// Default limit for create-session bodies.
    pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

    /// Compile and validate a route table.
    ///
    /// # Errors
    ///
    /// Any template error, or a template missing `[session]`, or a
    /// create/relay template missing `[protocols]`, or an info template
    /// carrying `[protocols]`.
    pub fn new(table: &RouteTable) -> Result<Self, RouteConfigError> {
        let mut templates = Vec::with_capacity(RouteKind::MATCH_ORDER.len());
        for kind in RouteKind::MATCH_ORDER {
            let source = table.template(kind);
            let template = RouteTemplate::parse(source)?;

            if !template.has_session() {
                return Err(RouteConfigError::MissingPlaceholder {
                    kind,
                    template: source.to_string(),
                    name: "session",
                });
            }
            match (kind.takes_protocols(), template.has_protocols()) {
                (true, false) => {
                    return Err(RouteConfigError::MissingPlaceholder {
                        kind,
                        template: source.to_string(),
                        name: "protocols",
                    });
                }
                (false, true) => {
                    return Err(RouteConfigError::UnexpectedPlaceholder {
                        kind,
                        template: source.to_string(),
                        name: "protocols",
                    });
                }
                _ => {}
            }
            templates.push((kind, template));
        }

        Ok(Self {
            templates,
            body_limit: Self::DEFAULT_BODY_LIMIT,
        })
    }

    /// Cap the size of create-session bodies.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The compiled template for `kind`.
    pub fn template(&self, kind: RouteKind) -> &RouteTemplate {
        // `new` compiles every kind in MATCH_ORDER
        &self.templates[kind.match_index()].1
    }

    /// The supported routes, in advertised order.
    pub fn routes(&self) -> Vec<SupportedRoute> {
        RouteKind::LISTING_ORDER
            .iter()
            .map(|&kind| SupportedRoute {
                kind,
                method: kind.method_name(),
                path: self.template(kind).as_str().to_string(),
                description: kind.description(),
            })
            .collect()
    }

    /// Classify a method and path.
    ///
    /// # Errors
    ///
    /// - `InvalidRoute` when nothing matches
    /// - `InvalidProtocols` when `[protocols]` is not valid percent-encoding
    pub fn classify(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteError> {
        for (kind, template) in &self.templates {
            if !kind.method_name().eq_ignore_ascii_case(method.as_str()) {
                continue;
            }
            let Some(captures) = template.matches(path) else {
                continue;
            };

            let session_id = captures.session.unwrap_or_default().to_string();
            let protocols = match captures.protocols {
                Some(raw) => parse_protocols(raw)?,
                None => Vec::new(),
            };
            debug!(route = %kind, session_id = %session_id, "Classified relay request");
            return Ok(RouteMatch {
                kind: *kind,
                session_id,
                protocols,
            });
        }

        Err(RouteError::InvalidRoute {
            method: method.to_string(),
            path: path.to_string(),
            routes: self.routes(),
        })
    }

    /// Resolve a request into a [`Route`].
    ///
    /// Create-session requests have their body read as the responder URL;
    /// relay requests keep the untouched request.
    ///
    /// # Errors
    ///
    /// Classification errors, plus `InvalidResponderUrl` and
    /// `UnreadableBody` for create-session bodies.
    pub async fn route(&self, request: Request) -> Result<Route, RouteError> {
        let RouteMatch {
            kind,
            session_id,
            protocols,
        } = self.classify(request.method(), request.uri().path())?;

        Ok(match kind {
            RouteKind::CreateSession => {
                let url = read_responder_url(request.into_body(), self.body_limit).await?;
                Route::CreateSession {
                    session_id,
                    responder: SessionResponder::new(url, protocols),
                }
            }
            RouteKind::RelayResponderRequest => Route::RelayResponderRequest {
                session_id,
                protocols,
                request,
            },
            RouteKind::GetResponder => Route::GetResponder { session_id },
            RouteKind::RelayInitiatorRequest => Route::RelayInitiatorRequest {
                session_id,
                protocols,
                request,
            },
            RouteKind::GetInitiator => Route::GetInitiator { session_id },
        })
    }
}

/// Percent-decode a `[protocols]` capture and split it on `,`.
pub fn parse_protocols(raw: &str) -> Result<Vec<String>, RouteError> {
    let decoded = urlencoding::decode(raw).map_err(|_| RouteError::InvalidProtocols {
        raw: raw.to_string(),
    })?;
    Ok(decoded.split(',').map(str::to_string).collect())
}

async fn read_responder_url(body: Body, limit: usize) -> Result<Url, RouteError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| RouteError::UnreadableBody {
            reason: e.to_string(),
        })?;
    let text = String::from_utf8_lossy(&bytes);
    let value = text.trim();
    Url::parse(value).map_err(|e| RouteError::InvalidResponderUrl {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
