/*!
 * Image discovery, download and fan-out.
 *
 * - `sources`: Unsplash and Pixabay search backends
 * - `download`: streamed downloads with size, type and signature checks
 * - `resolver`: per-query resolution with caching and source fallback
 * - `fetch`: bounded-concurrency engine over many queries
 */

pub mod download;
pub mod fetch;
pub mod resolver;
pub mod sources;

pub use download::{HttpDownloader, ImageDownloader, ImageFormat, RetryingDownloader};
pub use fetch::{FetchEngine, FetchMode, FetchReport, ProgressCallback};
pub use resolver::{ImageResolver, Resolve};
pub use sources::{ImageSource, PixabaySource, UnsplashSource};
