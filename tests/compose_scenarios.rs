use base64::Engine;
use config_model::{HexColor, PaddingConfig, PaddingStyle, RenderConfig, RenderMode};
use image::{Rgb, RgbImage};
use leanframe::processing::compose::compose;
use leanframe::processing::decode::Decoder;
use leanframe::processing::layout::CanvasSize;
use leanframe::processing::orientation::Orientation;

const FILL: Rgb<u8> = Rgb([0x11, 0x22, 0x33]);

// JPEG 2x1 with EXIF orientation 6 (rotate 90 CW), base64 encoded
const ORIENT6_JPEG: &str = concat!(
    "/9j/4AAQSkZJRgABAQAAAQABAAD/4QAiRXhpZgAATU0AKgAAAAgAAQESAAMAAAABAAYAAAAAAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8UHRofHh0aHBwgJC4nICIsIxwcKDcpLDAxNDQ0Hyc5PTgyPC4zNDL/",
    "2wBDAQkJCQwLDBgNDRgyIRwhMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjL/wAARCAABAAIDASIAAhEBAxEB/8QAHwAAAQUBAQEBAQEAAAAAAAAAAAECAwQFBgcICQoL/8QAtRAAAgEDAwIEAwUFBAQAAAF9AQIDAAQRBRIhMUEGE1FhByJxFDKBkaEII0KxwRVS0fAkM2JyggkKFhcYGRolJicoKSo0NTY3ODk6Q0RFRkdISUpTVFVWV1hZWmNkZWZnaGlqc3R1dnd4eXqDhIWGh4iJipKTlJWWl5iZmqKjpKWmp6ipqrKztLW2t7i5usLDxMXGx8jJytLT1NXW19jZ2uHi4+Tl5ufo6erx8vP09fb3+Pn6/8QAHwEAAwEBAQEBAQEBAQAAAAAAAAECAwQFBgcICQoL/8QAtREAAgECBAQDBAcFBAQAAQJ3AAECAxEEBSExBhJBUQdhcRMiMoEIFEKRobHBCSMzUvAVYnLRChYkNOEl8RcYGRomJygpKjU2Nzg5OkNERUZHSElKU1RVVldYWVpjZGVmZ2hpanN0dXZ3eHl6goOEhYaHiImKkpOUlZaXmJmaoqOkpaanqKmqsrO0tba3uLm6wsPExcbHyMnK0tPU1dbX2Nna4uPk5ebn6Onq8vP09fb3+Pn6/9oADAMBAAIRAxEAPwDi6KKK+ZP3E//Z"
);

fn solid_render(mode: RenderMode) -> RenderConfig {
    RenderConfig {
        mode,
        padding: PaddingConfig {
            style: PaddingStyle::Solid,
            color: HexColor::BLACK,
            ..PaddingConfig::default()
        },
    }
}

fn close_to(actual: &Rgb<u8>, expected: Rgb<u8>) -> bool {
    actual
        .0
        .iter()
        .zip(expected.0)
        .all(|(a, e)| a.abs_diff(e) <= 2)
}

#[test]
fn cover_fills_the_canvas_without_padding() {
    let source = RgbImage::from_pixel(1600, 900, FILL);
    let frame = compose(
        &source,
        Orientation::IDENTITY,
        CanvasSize::new(800, 480),
        &solid_render(RenderMode::Cover),
    );
    assert_eq!(frame.dimensions(), (800, 480));
    for (x, y) in [(0, 0), (799, 0), (0, 479), (799, 479), (400, 240)] {
        assert!(close_to(frame.get_pixel(x, y), FILL), "padding at ({x},{y})");
    }
}

#[test]
fn contain_centers_square_between_solid_bands() {
    let source = RgbImage::from_pixel(400, 400, FILL);
    let frame = compose(
        &source,
        Orientation::IDENTITY,
        CanvasSize::new(800, 480),
        &solid_render(RenderMode::Contain),
    );
    assert_eq!(frame.dimensions(), (800, 480));
    // 480x480 image at x = 160..640
    for y in [0, 240, 479] {
        assert_eq!(*frame.get_pixel(0, y), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(159, y), Rgb([0, 0, 0]));
        assert!(close_to(frame.get_pixel(160, y), FILL));
        assert!(close_to(frame.get_pixel(639, y), FILL));
        assert_eq!(*frame.get_pixel(640, y), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(799, y), Rgb([0, 0, 0]));
    }
}

#[test]
fn exif_orientation_is_honored_end_to_end() {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(ORIENT6_JPEG)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orient6.jpg");
    std::fs::write(&path, &bytes).unwrap();

    let canvas = CanvasSize::new(20, 40);
    let decoded = Decoder::new().decode(&path, canvas).unwrap();
    let upright = decoded.orientation.apply(decoded.pixels.clone());
    assert_eq!(upright.dimensions(), (1, 2));

    let frame = compose(
        &decoded.pixels,
        decoded.orientation,
        canvas,
        &solid_render(RenderMode::Contain),
    );
    assert_eq!(frame.dimensions(), (20, 40));
}
