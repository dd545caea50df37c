pub mod image_helper {
    use image::{ImageEncoder, RgbaImage};
    use std::io::BufWriter;
    use std::path::Path;

    /// Writes an RGBA canvas to `path` as PNG, replacing any existing file.
    pub fn save_png(path: &Path, canvas: &RgbaImage) -> Result<(), image::error::ImageError> {
        let output = BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}
