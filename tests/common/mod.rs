//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const BACKGROUND: [u8; 4] = [245, 245, 245, 255];
pub const SUBJECT: [u8; 4] = [30, 60, 160, 255];

/// Uniform background with one uniform rectangle `(x0, y0, x1, y1)` (exclusive end)
pub fn framed_subject(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba(BACKGROUND));
    for y in rect.1..rect.3 {
        for x in rect.0..rect.2 {
            img.put_pixel(x, y, Rgba(SUBJECT));
        }
    }
    img
}

pub fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("PNG encoding");
    bytes
}

pub fn framed_subject_png() -> Vec<u8> {
    encode_png(&framed_subject(40, 30, (12, 8, 28, 24)))
}

/// Minimal HTTP endpoint answering every request with a fixed response
pub struct MockService {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockService {
    pub async fn spawn(status: u16, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let body = body.into();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                log.lock().expect("request log").push(request);

                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base: format!("http://{}/api", addr),
            requests,
            handle,
        }
    }

    /// Success payload carrying `image` as a PNG data URL
    pub async fn returning(image: &RgbaImage) -> Self {
        let url = bg_composer::utils::data_url::encode("image/png", &encode_png(image));
        Self::spawn(200, format!(r#"{{"success":true,"image":"{}"}}"#, url)).await
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log").clone()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A base URL nothing listens on
pub const UNREACHABLE_API: &str = "http://127.0.0.1:1/api";
