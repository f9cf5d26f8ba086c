use std::error::Error;

use log::debug;

use crate::map::map_tile::{DecodedImage, MapTile, TileCoord};
use crate::map::viewport::TileTemplate;

pub type FetchError = Box<dyn Error + Send + Sync>;

/// Downloads background tiles from a URL template, and popup images.
#[derive(Debug, Clone)]
pub struct TileRetriever {
    client: reqwest::Client,
    template: TileTemplate,
}

impl TileRetriever {
    pub fn new(template: TileTemplate) -> Self {
        Self {
            client: reqwest::Client::new(),
            template,
        }
    }

    /// Asynchronously fetches a tile and converts it into a MapTile.
    pub async fn fetch_tile(&self, coord: TileCoord) -> Result<MapTile, FetchError> {
        let url = self.template.url(coord.z, coord.x, coord.y);
        let image = self.fetch_image(&url).await?;
        Ok(MapTile::new(coord, image))
    }

    /// Fetches any raster image and decodes it to RGBA.
    pub async fn fetch_image(&self, url: &str) -> Result<DecodedImage, FetchError> {
        debug!("fetching {url}");
        let response = self.client.get(url).send().await?;

        // If the response is not successful, return an error
        if !response.status().is_success() {
            return Err(format!("failed to fetch {url}: {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        decode(&bytes)
    }
}

pub fn decode(bytes: &[u8]) -> Result<DecodedImage, FetchError> {
    let image_buffer = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = image_buffer.dimensions();
    Ok(DecodedImage {
        size: [width as usize, height as usize],
        rgba: image_buffer.into_raw(),
    })
}
