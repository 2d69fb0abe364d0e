use std::borrow::Cow;
use std::fmt::Write;
use std::net::SocketAddr;

use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::StatsConfig;

use super::{GaugeSink, SinkError};

/// StatsD gauge sink over UDP.
///
/// The socket is bound and connected on first use, so constructing the sink
/// never touches the network. Every line carries `hostname:<hostname>` and
/// the configured global tags ahead of the per-call tags.
pub struct StatsdSink {
    addr: String,
    telegraf: bool,
    global_tags: Vec<String>,
    socket: OnceCell<UdpSocket>,
}

impl StatsdSink {
    /// Creates a sink addressed and tagged from the stats configuration.
    pub fn new(cfg: &StatsConfig) -> Self {
        let mut global_tags = Vec::with_capacity(cfg.global_tags.len() + 1);
        if !cfg.hostname.is_empty() {
            global_tags.push(format!("hostname:{}", cfg.hostname));
        }
        global_tags.extend(cfg.global_tags.iter().cloned());

        Self {
            addr: cfg.sink_addr(),
            telegraf: cfg.telegraf,
            global_tags,
            socket: OnceCell::new(),
        }
    }

    /// Returns the `host:port` this sink sends to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the tags prepended to every line.
    pub fn global_tags(&self) -> &[String] {
        &self.global_tags
    }

    /// Formats one gauge line.
    ///
    /// DogStatsD style: `name:value|g|#a:b,c`.
    /// Telegraf style: `name,a=b,c:value|g`.
    ///
    /// Reserved characters in per-call tags are replaced with `_`.
    pub fn format_line(&self, metric: &str, value: f64, tags: &[String]) -> String {
        let all_tags = self
            .global_tags
            .iter()
            .map(|t| Cow::Borrowed(t.as_str()))
            .chain(tags.iter().map(|t| escape_tag(t, self.telegraf)));
        let mut line = String::with_capacity(metric.len() + 64);
        line.push_str(metric);

        if self.telegraf {
            for tag in all_tags {
                line.push(',');
                match tag.split_once(':') {
                    Some((k, v)) => {
                        line.push_str(k);
                        line.push('=');
                        line.push_str(v);
                    }
                    None => line.push_str(&tag),
                }
            }
            let _ = write!(line, ":{value}|g");
        } else {
            let _ = write!(line, ":{value}|g");
            let mut first = true;
            for tag in all_tags {
                line.push_str(if first { "|#" } else { "," });
                line.push_str(&tag);
                first = false;
            }
        }

        line
    }

    async fn socket(&self) -> Result<&UdpSocket, SinkError> {
        self.socket
            .get_or_try_init(|| async {
                let target = resolve(&self.addr).await?;
                let bind: SocketAddr = if target.is_ipv6() {
                    SocketAddr::from(([0u16; 8], 0))
                } else {
                    SocketAddr::from(([0u8; 4], 0))
                };
                let socket = UdpSocket::bind(bind).await?;
                socket.connect(target).await?;
                debug!(addr = %target, "statsd socket connected");
                Ok::<_, SinkError>(socket)
            })
            .await
    }
}

impl GaugeSink for StatsdSink {
    fn name(&self) -> &str {
        "statsd"
    }

    async fn gauge(&self, metric: &str, value: f64, tags: &[String]) -> Result<(), SinkError> {
        if !value.is_finite() {
            return Err(SinkError::InvalidValue {
                metric: metric.to_string(),
                value,
            });
        }

        let line = self.format_line(metric, value, tags);
        let socket = self.socket().await?;
        socket.send(line.as_bytes()).await?;
        Ok(())
    }
}

/// Replaces characters that would split or end a tag. The first `:`
/// separates key from value and is kept; Telegraf lines also reserve `:`
/// inside the value.
fn escape_tag(tag: &str, telegraf: bool) -> Cow<'_, str> {
    let reserved = |c: char| matches!(c, '|' | ',' | '#') || (telegraf && c == ':');
    let (key, value) = tag.split_once(':').unwrap_or((tag, ""));
    if !key.contains(reserved) && !value.contains(reserved) {
        return Cow::Borrowed(tag);
    }

    let key = key.replace(reserved, "_");
    if tag.contains(':') {
        Cow::Owned(format!("{key}:{}", value.replace(reserved, "_")))
    } else {
        Cow::Owned(key)
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, SinkError> {
    let mut addrs = lookup_host(addr).await.map_err(|source| SinkError::Resolve {
        addr: addr.to_string(),
        source,
    })?;
    addrs
        .next()
        .ok_or_else(|| SinkError::NoAddress(addr.to_string()))
}
