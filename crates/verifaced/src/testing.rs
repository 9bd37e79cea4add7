//! Deterministic embedder and image fixtures for tests.

use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use veriface_core::{EmbedError, Embedding, FaceEmbedder};

/// Treats the top-left pixel as one face, embedded as its RGB color in [0, 1].
/// A top-right pixel of a different color is a second face. White means no face.
pub struct ColorEmbedder;

impl FaceEmbedder for ColorEmbedder {
    fn embed_faces(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EmbedError> {
        let first = *image.get_pixel(0, 0);
        if first == Rgb([255, 255, 255]) {
            return Ok(vec![]);
        }

        let last = *image.get_pixel(image.width() - 1, 0);
        let mut faces = vec![color_embedding(first)];
        if last != first {
            faces.push(color_embedding(last));
        }
        Ok(faces)
    }
}

fn color_embedding(Rgb(c): Rgb<u8>) -> Embedding {
    Embedding::new(c.iter().map(|&v| v as f32 / 255.0).collect())
}

/// Solid-color 8×8 PNG.
pub fn png(color: [u8; 3]) -> Vec<u8> {
    encode(RgbImage::from_pixel(8, 8, Rgb(color)))
}

/// 8×8 PNG whose left and right halves have different colors (two faces).
pub fn two_face_png(left: [u8; 3], right: [u8; 3]) -> Vec<u8> {
    encode(RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb(left) } else { Rgb(right) }))
}

fn encode(image: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A localhost address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
