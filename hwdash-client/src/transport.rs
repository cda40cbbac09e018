use bytes::{BufMut, Bytes, BytesMut};
use http::{Method, Request, Response, Uri, header, response};
use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, lookup_host},
};
use tokio_native_tls::{TlsConnector as TokioTlsConnector, native_tls::TlsConnector};

/// Build a bodyless `GET` request for `uri`, presenting `token` as a bearer
/// credential.
pub fn bearer_get_request(uri: Uri, token: &str) -> anyhow::Result<Request<()>> {
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?
        .as_str();
    let host = authority
        .find('@')
        .map(|idx| authority.split_at(idx + 1).1)
        .unwrap_or(authority);

    if host.is_empty() {
        anyhow::bail!("URL error: empty host name");
    }

    let req = Request::builder()
        .method(Method::GET)
        .header(header::HOST, host)
        .header(header::CONNECTION, "close")
        .header(header::ACCEPT_ENCODING, "identity")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .uri(uri)
        .body(())?;

    Ok(req)
}

/// One HTTP/1.1 round trip: connect, send, read to EOF, parse.
///
/// TLS is selected by the URL scheme. The request carries
/// `Connection: close`, so the whole response is buffered before parsing.
pub async fn send_request(req: Request<()>) -> anyhow::Result<Response<Bytes>> {
    let uri = req.uri();
    let tls = match uri.scheme_str() {
        Some("https") => true,
        Some("http") => false,
        _ => anyhow::bail!("URL error: unsupported scheme"),
    };
    let host = uri
        .host()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?;
    // IPv6 literals keep their brackets in the authority
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .to_owned();
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    let stream = connect(&host, port).await?;

    trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin {}
    impl<T: AsyncRead + AsyncWrite + Unpin> AsyncReadWrite for T {}
    let mut stream: Box<dyn AsyncReadWrite> = if tls {
        let connector = TokioTlsConnector::from(TlsConnector::new()?);
        Box::new(connector.connect(&host, stream).await?)
    } else {
        Box::new(stream)
    };

    stream.write_all(&assemble_request(req)?).await?;
    stream.flush().await?;

    let resp = {
        let mut buffer = BytesMut::with_capacity(128);
        while stream.read_buf(&mut buffer).await? != 0 {}

        let buffer = buffer.freeze();
        trace!("response: {:?}", String::from_utf8_lossy(&buffer));
        parse_response(buffer)?
    };

    Ok(resp)
}

async fn connect(host: &str, port: u16) -> anyhow::Result<TcpStream> {
    debug!("looking up address information for ({host}, {port})");
    for addr in lookup_host((host, port)).await? {
        trace!("trying {addr}...");
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!("connection established with {addr}");
                return Ok(stream);
            }
            Err(e) => trace!("connection attempt failed: {e}"),
        }
    }

    Err(anyhow::anyhow!("I/O error: all connection attempts failed"))
}

fn assemble_request(req: Request<()>) -> anyhow::Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(128);

    buffer.put_slice(
        format!(
            "{} {} {:?}\r\n",
            req.method(),
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/"),
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

    trace!("request: {:?}", String::from_utf8_lossy(&buffer));

    Ok(buffer.freeze())
}

fn parse_response(bytes: Bytes) -> anyhow::Result<Response<Bytes>> {
    const MAX_HEADERS: usize = 64;
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);

    let status = resp.parse(&bytes)?;

    if status.is_partial() {
        anyhow::bail!("HTTP error: response is incomplete");
    }

    let body_start_index = status.unwrap();

    let mut response_builder = response::Builder::new().status(resp.code.unwrap_or(200));

    for header in resp.headers {
        response_builder = response_builder.header(header.name, header.value);
    }

    let body = bytes.slice(body_start_index..);

    Ok(response_builder.body(body)?)
}
