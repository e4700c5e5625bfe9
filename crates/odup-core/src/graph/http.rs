//! Minimal blocking HTTP request helper on top of curl's Easy interface.

use std::io::Read;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Method {
    Get,
    Post,
    Put,
}

#[derive(Debug)]
pub(super) struct Response {
    pub status: u32,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Perform one request. `headers` are full header lines (`"Name: value"`).
/// Only transport failures are errors; any HTTP status is returned as-is.
pub(super) fn request(
    method: Method,
    url: &str,
    headers: &[String],
    body: &[u8],
) -> Result<Response, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;

    match method {
        Method::Get => easy.get(true)?,
        Method::Post => {
            easy.post(true)?;
            easy.post_field_size(body.len() as u64)?;
        }
        Method::Put => {
            easy.upload(true)?;
            easy.in_filesize(body.len() as u64)?;
        }
    }

    let mut list = curl::easy::List::new();
    for h in headers {
        list.append(h)?;
    }
    // No 100-continue round trip before large bodies.
    list.append("Expect:")?;
    easy.http_headers(list)?;

    let mut input = body;
    let mut response = Vec::new();
    {
        let mut transfer = easy.transfer();
        if method != Method::Get {
            transfer.read_function(|buf| Ok(input.read(buf).unwrap_or(0)))?;
        }
        transfer.write_function(|data| {
            response.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(Response {
        status,
        body: response,
    })
}
