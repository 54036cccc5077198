use super::{AnimationOptions, AssetFetcher};
use crate::models::Task;
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use std::sync::Arc;
use std::time::Duration;

/// NeuQuant sampling factor: 1 is slowest, 30 fastest; 10 is the codec's usual default.
const GIF_QUANTIZER_SPEED: i32 = 10;

pub struct AssetAssembler {
    fetcher: Arc<dyn AssetFetcher>,
    max_concurrent_fetches: usize,
}

impl AssetAssembler {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, max_concurrent_fetches: usize) -> Self {
        Self {
            fetcher,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Download the final render of a finished task.
    pub async fn fetch_single(&self, task: &Task) -> Result<Vec<u8>> {
        let url = task.final_photo_url().ok_or_else(|| Error::Fetch {
            url: String::new(),
            reason: format!("task {} has an empty photo list", task.id),
        })?;

        tracing::info!("Downloading final render of task {}", task.id);
        self.fetcher.fetch(url).await
    }

    /// Fetch every URL concurrently and return the bodies in input order.
    ///
    /// The first failure aborts the batch; dropping the stream cancels the
    /// fetches still outstanding.
    pub async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Vec<u8>>> {
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; urls.len()];

        let mut fetches = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move {
                self.fetcher.fetch(url).await.map(|bytes| (index, bytes))
            })
            .buffer_unordered(self.max_concurrent_fetches);

        while let Some(fetched) = fetches.next().await {
            let (index, bytes) = fetched?;
            slots[index] = Some(bytes);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| Error::Invariant(format!("Frame {} was never fetched", index)))
            })
            .collect()
    }

    /// Fetch all frames and encode them as a GIF that plays through once.
    pub async fn assemble_animation(
        &self,
        urls: &[String],
        options: AnimationOptions,
    ) -> Result<Vec<u8>> {
        if urls.is_empty() {
            return Err(Error::Encode("No frames to animate".to_string()));
        }

        tracing::info!("Assembling animation from {} frames", urls.len());
        let frames = self.fetch_all(urls).await?;

        let frame_duration = options.frame_duration;
        tokio::task::spawn_blocking(move || encode_gif(&frames, frame_duration))
            .await
            .map_err(|e| Error::Invariant(format!("Animation encoding task join error: {}", e)))?
    }
}

/// Decode each image and write them, in order, as frames of a GIF with a
/// loop count of one.
pub fn encode_gif(frames: &[Vec<u8>], frame_duration: Duration) -> Result<Vec<u8>> {
    let delay = Delay::from_saturating_duration(frame_duration);
    let mut out = Vec::new();

    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, GIF_QUANTIZER_SPEED);
        encoder
            .set_repeat(Repeat::Finite(1))
            .map_err(|e| Error::Encode(format!("Failed to set loop count: {}", e)))?;

        for (index, bytes) in frames.iter().enumerate() {
            let image = image::load_from_memory(bytes)
                .map_err(|e| Error::Encode(format!("Failed to decode frame {}: {}", index, e)))?
                .to_rgba8();

            encoder
                .encode_frame(Frame::from_parts(image, 0, 0, delay))
                .map_err(|e| Error::Encode(format!("Failed to encode frame {}: {}", index, e)))?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MockAssetFetcher;
    use crate::models::TaskState;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn solid_png(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn decode_frames(gif: &[u8]) -> Vec<image::Frame> {
        GifDecoder::new(Cursor::new(gif))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
    }

    fn dominant_channel(frame: &image::Frame) -> usize {
        let px = frame.buffer().get_pixel(0, 0).0;
        (0..3).max_by_key(|&c| px[c]).unwrap()
    }

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_single_uses_last_url() {
        let fetcher = MockAssetFetcher::new()
            .with_asset("u1", vec![1])
            .with_asset("u2", vec![2]);
        let assembler = AssetAssembler::new(Arc::new(fetcher), 4);
        let task = Task {
            id: "t".to_string(),
            state: TaskState::Completed,
            photo_url_list: urls(&["u1", "u2"]),
        };

        assert_eq!(assembler.fetch_single(&task).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_fetch_single_empty_list_is_fetch_error() {
        let assembler = AssetAssembler::new(Arc::new(MockAssetFetcher::new()), 4);
        let task = Task {
            id: "t".to_string(),
            state: TaskState::Completed,
            photo_url_list: vec![],
        };

        assert!(matches!(
            assembler.fetch_single(&task).await,
            Err(Error::Fetch { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_order_follows_input_not_completion() {
        let fetcher = MockAssetFetcher::new()
            .with_delayed_asset("A", solid_png(RED), Duration::from_millis(20))
            .with_delayed_asset("B", solid_png(GREEN), Duration::from_millis(40))
            .with_delayed_asset("C", solid_png(BLUE), Duration::ZERO);
        let probe = fetcher.clone();
        let assembler = AssetAssembler::new(Arc::new(fetcher), 8);

        let gif = assembler
            .assemble_animation(&urls(&["A", "B", "C"]), AnimationOptions::default())
            .await
            .unwrap();

        assert_eq!(probe.get_completion_order(), vec!["C", "A", "B"]);
        let frames = decode_frames(&gif);
        assert_eq!(frames.len(), 3);
        let channels: Vec<usize> = frames.iter().map(dominant_channel).collect();
        assert_eq!(channels, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_run_concurrently_within_bound() {
        let mut fetcher = MockAssetFetcher::new();
        let names: Vec<String> = (0..6).map(|i| format!("u{}", i)).collect();
        for name in &names {
            fetcher = fetcher.with_delayed_asset(name, vec![0], Duration::from_millis(10));
        }
        let probe = fetcher.clone();
        let assembler = AssetAssembler::new(Arc::new(fetcher), 3);

        let bodies = assembler.fetch_all(&names).await.unwrap();
        assert_eq!(bodies.len(), 6);
        assert_eq!(probe.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failed_fetch_fails_whole_animation() {
        let fetcher = MockAssetFetcher::new()
            .with_asset("A", solid_png(RED))
            .with_failure("B", Duration::from_millis(5))
            .with_delayed_asset("C", solid_png(BLUE), Duration::from_millis(50));
        let assembler = AssetAssembler::new(Arc::new(fetcher), 8);

        let err = assembler
            .assemble_animation(&urls(&["A", "B", "C"]), AnimationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { url, .. } if url == "B"));
    }

    #[tokio::test]
    async fn test_empty_url_list_rejected() {
        let assembler = AssetAssembler::new(Arc::new(MockAssetFetcher::new()), 8);
        let err = assembler
            .assemble_animation(&[], AnimationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_encode_error() {
        let fetcher = MockAssetFetcher::new()
            .with_asset("A", solid_png(RED))
            .with_asset("B", b"not an image".to_vec());
        let assembler = AssetAssembler::new(Arc::new(fetcher), 8);

        let err = assembler
            .assemble_animation(&urls(&["A", "B"]), AnimationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode(msg) if msg.contains("frame 1")));
    }

    #[test]
    fn test_gif_loops_once_with_frame_delay() {
        let gif = encode_gif(
            &[solid_png(RED), solid_png(GREEN)],
            Duration::from_millis(250),
        )
        .unwrap();

        let loop_once: &[u8] = b"NETSCAPE2.0\x03\x01\x01\x00";
        assert!(gif.windows(loop_once.len()).any(|w| w == loop_once));

        let frames = decode_frames(&gif);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delay().numer_denom_ms(), (250, 1));
    }

    #[test]
    fn test_large_frames_encode_with_fast_quantizer() {
        let gradient = |shift: u32| {
            let img = RgbaImage::from_fn(256, 256, |x, y| {
                Rgba([((x + shift) % 256) as u8, (y % 256) as u8, 128, 255])
            });
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .unwrap();
            bytes
        };

        let gif = encode_gif(&[gradient(0), gradient(64)], Duration::from_millis(100)).unwrap();

        let frames = decode_frames(&gif);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].buffer().dimensions(), (256, 256));
    }
}
