// THEORY:
// The `Pixel` module is the smallest unit the motion pipeline looks at. It is a
// "dumb" data container for one camera sample plus the single-pixel heuristic the
// rest of the crate needs: perceived brightness. Anything that compares pixels
// (differencing, thresholding, pooling) lives in `frame`, which works on whole
// buffers at once.
//
// Key principles:
// 1) Single-pixel scope: nothing here reads neighbours or history.
// 2) Camera frames arrive as packed RGB or RGBA bytes; both decode into the same
//    `Pixel`, alpha defaulting to opaque for RGB sources.
// 3) Luminance uses the Rec. 601 weights, the same conversion a camera-facing
//    grayscale stage conventionally applies.

pub mod pixel {
    pub type Channel = u8;
    pub type Luminance = f64;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        pub fn opaque(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, Channel::MAX)
        }

        /// Luminance estimate (Rec. 601 luma).
        ///
        /// - Interprets perceived brightness as a weighted sum of RGB.
        /// - Alpha does not contribute.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64
                + 0.587_f64 * self.green as f64
                + 0.114_f64 * self.blue as f64
        }

        /// Luminance rounded back into the 0..=255 byte range of a grayscale image.
        pub fn gray(&self) -> Channel {
            self.luminance().round().clamp(0.0, 255.0) as Channel
        }
    }

    impl From<[Channel; 3]> for Pixel {
        fn from(bytes: [Channel; 3]) -> Self {
            Pixel::opaque(bytes[0], bytes[1], bytes[2])
        }
    }

    impl From<[Channel; 4]> for Pixel {
        fn from(bytes: [Channel; 4]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for image::Rgba<u8> {
        fn from(pixel: Pixel) -> Self {
            image::Rgba([pixel.red, pixel.green, pixel.blue, pixel.alpha])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn gray_of_primaries_follows_rec601() {
        assert_eq!(Pixel::opaque(255, 0, 0).gray(), 76);
        assert_eq!(Pixel::opaque(0, 255, 0).gray(), 150);
        assert_eq!(Pixel::opaque(0, 0, 255).gray(), 29);
    }

    #[test]
    fn white_and_black_hit_the_range_ends() {
        assert_eq!(Pixel::opaque(255, 255, 255).gray(), 255);
        assert_eq!(Pixel::opaque(0, 0, 0).gray(), 0);
    }

    #[test]
    fn rgb_bytes_decode_as_opaque() {
        let pixel = Pixel::from([10, 20, 30]);
        assert_eq!(pixel.alpha, 255);
        assert_eq!(Pixel::from([10, 20, 30, 40]).alpha, 40);
    }
}
