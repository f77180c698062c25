use super::*;
use crate::test_support::StubFetcher;
use image::{GenericImageView, Rgba, RgbaImage};
use kml_ingest_core::{ExternalGraphic, StyleFragment, Symbolizer};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const PIN_URL: &str = "http://icons.example/pin.png";
const YELLOW: Color = Color::rgba(255, 255, 0, 255);

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
    raster::encode(image, ImageFormat::Png).expect("encode fixture")
}

fn gif(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 255, 255]));
    raster::encode(image, ImageFormat::Gif).expect("encode fixture")
}

struct Workspace {
    _guard: TempDir,
    root: Utf8PathBuf,
    output: Utf8PathBuf,
}

#[fixture]
fn workspace() -> Workspace {
    let guard = TempDir::new().expect("tempdir");
    let base = Utf8PathBuf::from_path_buf(guard.path().to_path_buf()).expect("utf-8 tempdir");
    Workspace {
        root: base.join("source"),
        output: base.join("styles"),
        _guard: guard,
    }
}

#[fixture]
fn pin_server() -> StubFetcher {
    StubFetcher::default().with_body(PIN_URL, png(32, 32))
}

fn dimensions(path: &Utf8Path) -> (u32, u32) {
    image::open(path.as_std_path())
        .expect("generated image")
        .dimensions()
}

#[rstest]
fn one_fetch_serves_two_derivatives(workspace: Workspace, pin_server: StubFetcher) {
    let mut cache = AssetCache::new(&pin_server, &workspace.root, &workspace.output);

    let tinted = cache.resolve(PIN_URL, Some(YELLOW), None).expect("tinted");
    let scaled = cache
        .resolve(PIN_URL, Some(YELLOW), Some(2.0))
        .expect("tinted and scaled");

    assert_eq!(pin_server.request_count(PIN_URL), 1);
    assert_eq!(tinted, workspace.output.join("ffffff00-pin.png"));
    assert_eq!(scaled, workspace.output.join("64-ffffff00-pin.png"));
    assert_eq!(dimensions(&tinted), (32, 32));
    assert_eq!(dimensions(&scaled), (64, 64));
    assert!(cache.finish().is_empty());
}

#[rstest]
fn repeated_requests_reuse_the_first_result(workspace: Workspace, pin_server: StubFetcher) {
    let mut cache = AssetCache::new(&pin_server, &workspace.root, &workspace.output);
    let first = cache.resolve(PIN_URL, None, Some(0.5));
    let second = cache.resolve(PIN_URL, None, Some(0.5));
    assert_eq!(first, second);
    assert_eq!(first, Some(workspace.output.join("16-pin.png")));
    assert_eq!(pin_server.requests(), [PIN_URL]);
}

#[rstest]
fn failures_are_cached_and_reported_once(workspace: Workspace) {
    let fetcher = StubFetcher::default();
    let missing = "http://icons.example/missing.png";
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);

    assert!(cache.resolve(missing, Some(YELLOW), None).is_none());
    assert!(cache.resolve(missing, Some(YELLOW), None).is_none());
    assert_eq!(cache.warnings().len(), 1);
    assert!(cache.warnings()[0].contains("404"), "{:?}", cache.warnings());

    // A new tint does not retry the broken location either.
    assert!(cache.resolve(missing, Some(Color::WHITE), None).is_none());
    assert_eq!(fetcher.request_count(missing), 1);
    assert_eq!(cache.finish().len(), 2);
}

#[rstest]
fn relative_sources_resolve_against_the_root(workspace: Workspace) {
    let fetcher = StubFetcher::default();
    kml_ingest_fs::write_file(&workspace.root.join("icons/pin.png"), &png(8, 4)).expect("icon");
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);

    let scaled = cache
        .resolve("icons/pin.png", None, Some(1.5))
        .expect("scaled");

    assert_eq!(scaled, workspace.output.join("12-pin.png"));
    assert_eq!(dimensions(&scaled), (12, 6));
    assert!(fetcher.requests().is_empty());
}

#[rstest]
fn jpeg_sources_keep_their_format(workspace: Workspace) {
    let fetcher = StubFetcher::default();
    let image = RgbaImage::from_pixel(6, 6, Rgba([10, 200, 30, 255]));
    let jpeg = raster::encode(image, ImageFormat::Jpeg).expect("jpeg");
    kml_ingest_fs::write_file(&workspace.root.join("photo.jpg"), &jpeg).expect("photo");
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);

    let tinted = cache
        .resolve("photo.jpg", Some(Color::rgba(255, 0, 0, 255)), None)
        .expect("tinted");

    assert_eq!(tinted, workspace.output.join("ffff0000-photo.jpg"));
    let bytes = kml_ingest_fs::read_file(&tinted).expect("output");
    assert_eq!(
        image::guess_format(&bytes).expect("format"),
        ImageFormat::Jpeg
    );
}

#[rstest]
#[case("icons/notes.txt", b"not an image".as_slice())]
#[case("icons/none.png", b"".as_slice())]
fn undecodable_sources_become_warnings(
    workspace: Workspace,
    #[case] source: &str,
    #[case] contents: &[u8],
) {
    let fetcher = StubFetcher::default();
    kml_ingest_fs::write_file(&workspace.root.join(source), contents).expect("fixture");
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);
    assert!(cache.resolve(source, Some(YELLOW), None).is_none());
    assert_eq!(cache.finish().len(), 1);
}

#[rstest]
#[case("ftp://icons.example/pin.png")]
#[case("http://icons.example/")]
fn unusable_locations_are_rejected(workspace: Workspace, #[case] source: &str) {
    let fetcher = StubFetcher::default();
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);
    assert!(cache.resolve(source, Some(YELLOW), None).is_none());
    assert_eq!(cache.warnings().len(), 1);
}

#[rstest]
fn invalid_scales_are_rejected(workspace: Workspace, pin_server: StubFetcher) {
    let mut cache = AssetCache::new(&pin_server, &workspace.root, &workspace.output);
    assert!(cache.resolve(PIN_URL, None, Some(0.0)).is_none());
    assert!(cache.warnings()[0].contains("cannot scale"));
}

#[rstest]
fn downloads_are_removed_when_the_run_finishes(workspace: Workspace, pin_server: StubFetcher) {
    let mut cache = AssetCache::new(&pin_server, &workspace.root, &workspace.output);
    cache.resolve(PIN_URL, Some(YELLOW), None).expect("tinted");
    let downloads = cache.download_paths();
    assert_eq!(downloads.len(), 1);
    assert!(downloads[0].exists());

    cache.finish();

    assert!(!downloads[0].exists());
    assert!(workspace.output.join("ffffff00-pin.png").exists());
}

#[rstest]
fn sniffs_missing_formats_once_per_source(workspace: Workspace) {
    let marker = "http://icons.example/marker";
    let fetcher = StubFetcher::default().with_body(marker, gif(2, 2));
    kml_ingest_fs::write_file(&workspace.root.join("icons/pin"), &png(2, 2)).expect("icon");
    kml_ingest_fs::write_file(&workspace.root.join("icons/notes"), b"plain").expect("notes");
    let point = |href: &str| Symbolizer::Point {
        graphic: Some(ExternalGraphic::new(href)),
    };
    let mut map: StyleMap = [
        StyleFragment::new("#a", vec![point("icons/pin")]),
        StyleFragment::new("#b", vec![point(marker)]),
        StyleFragment::new("#c", vec![point(marker)]),
        StyleFragment::new("#d", vec![point("icons/notes")]),
    ]
    .into_iter()
    .collect();
    let mut cache = AssetCache::new(&fetcher, &workspace.root, &workspace.output);

    cache.sniff_formats(&mut map);

    let formats: Vec<Option<&str>> = map
        .iter()
        .map(|fragment| {
            fragment.symbolizers[0]
                .graphic()
                .and_then(|graphic| graphic.format.as_deref())
        })
        .collect();
    assert_eq!(
        formats,
        [Some("image/png"), Some("image/gif"), Some("image/gif"), None]
    );
    assert_eq!(fetcher.request_count(marker), 1);
}

#[rstest]
fn processing_points_graphics_at_generated_files(workspace: Workspace, pin_server: StubFetcher) {
    let mut map: StyleMap = [
        StyleFragment::new(
            "#tinted",
            vec![Symbolizer::Point {
                graphic: Some(ExternalGraphic::new(PIN_URL).with_tint(YELLOW)),
            }],
        ),
        StyleFragment::new(
            "#plain",
            vec![Symbolizer::Point {
                graphic: Some(ExternalGraphic::new(PIN_URL)),
            }],
        ),
        StyleFragment::new(
            "#unknown",
            vec![Symbolizer::Point {
                graphic: Some(ExternalGraphic::new("http://icons.example/icon").with_scale(2.0)),
            }],
        ),
    ]
    .into_iter()
    .collect();
    let mut cache = AssetCache::new(&pin_server, &workspace.root, &workspace.output);

    assert_eq!(cache.process_graphics(&mut map), 1);

    let href = |id: &str| {
        map.get(&id.into())
            .and_then(|fragment| fragment.symbolizers[0].graphic())
            .map(|graphic| graphic.href.clone())
            .expect("graphic")
    };
    assert_eq!(href("#tinted"), "ffffff00-pin.png");
    assert_eq!(href("#plain"), PIN_URL);
    assert_eq!(href("#unknown"), "http://icons.example/icon");
    assert_eq!(pin_server.requests(), [PIN_URL]);
}

#[rstest]
#[case(&[0x89, 0x50, 0x4E, 0x47, 0x0D], Some("image/png"))]
#[case(&[0xFF, 0xD8, 0xFF, 0xE0], Some("image/jpeg"))]
#[case(b"GIF89a", Some("image/gif"))]
#[case(&[0xFF, 0xD8, 0xFF, 0xE1], None)]
#[case(b"PK", None)]
fn recognises_magic_numbers(#[case] prefix: &[u8], #[case] expected: Option<&str>) {
    assert_eq!(mime_from_magic(prefix), expected);
}
