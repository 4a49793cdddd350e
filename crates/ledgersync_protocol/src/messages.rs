//! Proxy request and page response envelopes.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Query-parameter naming convention expected by the upstream API.
///
/// Which convention applies is deployment configuration; the engine itself
/// only ever sees `(page, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationStyle {
    /// `pagination[page]` / `pagination[pageSize]`.
    #[default]
    PageSize,
    /// `pagination[page]` / `pagination[perpage]`.
    Perpage,
}

impl PaginationStyle {
    /// Builds the query parameters for one page request.
    pub fn params(&self, page: u64, page_size: u32) -> Map<String, Value> {
        let size_key = match self {
            PaginationStyle::PageSize => "pagination[pageSize]",
            PaginationStyle::Perpage => "pagination[perpage]",
        };
        let mut params = Map::new();
        params.insert("pagination[page]".into(), json!(page));
        params.insert(size_key.into(), json!(page_size));
        params.insert("sort".into(), json!("id:asc"));
        params
    }
}

/// The envelope POSTed to the forwarding proxy.
///
/// The proxy relays `params` and `body` to `endpoint`, attaching `token`
/// as a bearer credential when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Upstream endpoint the proxy forwards to.
    pub endpoint: String,
    /// Bearer token for the upstream, if it requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// HTTP method the proxy should use upstream.
    pub method: String,
    /// Query parameters for the upstream request.
    pub params: Map<String, Value>,
    /// Request body for the upstream request.
    pub body: Value,
}

impl ProxyRequest {
    /// Builds the page-fetch request relayed to `endpoint`.
    pub fn page(
        endpoint: impl Into<String>,
        token: Option<String>,
        style: PaginationStyle,
        page: u64,
        page_size: u32,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            method: "POST".into(),
            params: style.params(page, page_size),
            body: json!({}),
        }
    }
}

/// One page of records as returned by the upstream resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageData {
    /// The records on this page, in upstream order.
    pub data: Vec<Record>,
    /// Server-reported total record count, when the upstream includes one.
    /// Advisory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Opaque upstream metadata, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// The proxy's answer to a page request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEnvelope {
    /// Whether the upstream request succeeded.
    pub ok: bool,
    /// The page payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PageData>,
    /// Error description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageEnvelope {
    /// Creates a successful envelope carrying one page.
    pub fn success(data: PageData) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a successful envelope from records and an advisory total.
    pub fn page(records: Vec<Record>, total: Option<u64>) -> Self {
        Self::success(PageData {
            data: records,
            total,
            meta: None,
        })
    }

    /// Creates a failed envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
