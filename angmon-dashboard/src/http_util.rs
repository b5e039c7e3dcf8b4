use std::{pin::Pin, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use http::{Method, Request, Response, Uri, header, request, response};
use itertools::Itertools;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs, lookup_host},
    task::JoinSet,
};
use tokio_native_tls::{TlsConnector as TokioTlsConnector, TlsStream, native_tls::TlsConnector};
use tracing::{debug, trace};

const HAPPY_EYEBALLS_DELAY: Duration = Duration::from_millis(150);
const MAX_HEADERS: usize = 64;

pub enum MaybeTlsStream<S> {
    Plain(S),
    Tls(TlsStream<S>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Request with the headers every agent call carries. The agent's HTTP server speaks
/// HTTP/1.0 semantics, so the connection is closed after each response.
pub fn basic_request_builder(uri: &str, method: Method) -> anyhow::Result<request::Builder> {
    let uri = uri.parse::<Uri>()?;
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?
        .as_str();
    let host = authority
        .find('@')
        .map_or(authority, |idx| authority.split_at(idx + 1).1);

    if host.is_empty() {
        anyhow::bail!("URL error: empty host name");
    }

    Ok(Request::builder()
        .method(method)
        .header(header::HOST, host)
        .header(header::CONNECTION, "close")
        .header(header::ACCEPT, mime::APPLICATION_JSON.as_ref())
        .header(header::ACCEPT_ENCODING, "identity")
        .uri(uri))
}

pub async fn send_http_request<T: AsRef<[u8]>>(
    req: Request<T>,
    tls: bool,
    prefer_ipv6: bool,
) -> anyhow::Result<Response<Bytes>> {
    let stream = &mut connect_tls(&req, tls, prefer_ipv6).await?;

    stream.write_all(&assemble_http_request(&req)).await?;
    stream.flush().await?;

    let mut buffer = BytesMut::with_capacity(1024);
    while stream.read_buf(&mut buffer).await? != 0 {}

    let buffer = buffer.freeze();
    trace!("response: {:?}", String::from_utf8_lossy(&buffer));
    parse_http_response(buffer)
}

pub async fn connect_tls<T>(
    req: &Request<T>,
    tls: bool,
    prefer_ipv6: bool,
) -> anyhow::Result<MaybeTlsStream<TcpStream>> {
    let domain = req
        .uri()
        .host()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?;
    let domain = domain.trim_start_matches('[').trim_end_matches(']');
    let port = req.uri().port_u16().unwrap_or(if tls { 443 } else { 80 });
    trace!("connecting to ({domain}, {port})");
    let stream = connect_happy_eyeballs((domain, port), prefer_ipv6).await?;

    Ok(if tls {
        let connector = TokioTlsConnector::from(TlsConnector::new()?);
        MaybeTlsStream::Tls(connector.connect(domain, stream).await?)
    } else {
        MaybeTlsStream::Plain(stream)
    })
}

/// Race the resolved addresses, alternating families and giving each attempt a short head
/// start before the next one is launched.
async fn connect_happy_eyeballs<A: ToSocketAddrs>(
    addr: A,
    prefer_ipv6: bool,
) -> anyhow::Result<TcpStream> {
    let (v4, v6): (Vec<_>, Vec<_>) = lookup_host(addr).await?.partition(|a| a.is_ipv4());
    let (first, second) = if prefer_ipv6 { (v6, v4) } else { (v4, v6) };

    let mut attempts = JoinSet::new();
    for addr in first.into_iter().interleave(second) {
        attempts.spawn(TcpStream::connect(addr));

        let head_start = tokio::time::sleep(HAPPY_EYEBALLS_DELAY);
        tokio::pin!(head_start);
        loop {
            tokio::select! {
                biased;

                res = attempts.join_next() => match res {
                    Some(res) => {
                        if let Some(stream) = established(res) {
                            return Ok(stream);
                        }
                    }
                    None => break,
                },
                _ = &mut head_start => break,
            }
        }
    }

    while let Some(res) = attempts.join_next().await {
        if let Some(stream) = established(res) {
            return Ok(stream);
        }
    }

    Err(anyhow::anyhow!("I/O error: all connection attempts failed"))
}

fn established(
    res: Result<std::io::Result<TcpStream>, tokio::task::JoinError>,
) -> Option<TcpStream> {
    match res {
        Ok(Ok(stream)) => {
            debug!(
                "connection established with {}",
                stream
                    .peer_addr()
                    .map_or_else(|_| "<unknown>".to_owned(), |a| a.to_string())
            );
            Some(stream)
        }
        Ok(Err(e)) => {
            trace!("connection attempt failed: {e}");
            None
        }
        Err(e) => {
            trace!("connection attempt panicked: {e}");
            None
        }
    }
}

fn assemble_http_request<T: AsRef<[u8]>>(req: &Request<T>) -> Bytes {
    let mut buffer = BytesMut::with_capacity(256);

    buffer.put_slice(
        format!(
            "{} {} {:?}\r\n",
            req.method(),
            req.uri().path_and_query().map_or("/", |pq| pq.as_str()),
            req.version()
        )
        .as_bytes(),
    );

    for (name, value) in req.headers() {
        buffer.put_slice(name.as_str().as_bytes());
        buffer.put_slice(b": ");
        buffer.put_slice(value.as_bytes());
        buffer.put_slice(b"\r\n");
    }
    buffer.put_slice(b"\r\n");
    buffer.put_slice(req.body().as_ref());

    trace!("request: {:?}", String::from_utf8_lossy(&buffer));

    buffer.freeze()
}

fn parse_http_response(bytes: Bytes) -> anyhow::Result<Response<Bytes>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);

    let body_start = match resp.parse(&bytes)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => anyhow::bail!("HTTP error: response is incomplete"),
    };

    let mut builder = response::Builder::new()
        .status(resp.code.unwrap_or(200))
        .version(match resp.version {
            Some(0) => http::Version::HTTP_10,
            _ => http::Version::HTTP_11,
        });
    for header in resp.headers.iter() {
        builder = builder.header(header.name, header.value);
    }

    Ok(builder.body(bytes.slice(body_start..))?)
}
