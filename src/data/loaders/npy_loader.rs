//! Loader for NumPy `.npy` files.
//!
//! Handles 2-D images directly and projects 3-D channel stacks to a single
//! plane by averaging the channels.

use std::io::Cursor;

use ndarray::{Array2, ArrayD, Axis, Ix2};
use ndarray_npy::ReadNpyExt;

use crate::data::loader::{ImageLoader, LoaderError};

/// Loader for NumPy `.npy` files.
///
/// **Expected array shapes** (row-major image convention):
/// - 2D `(H, W)`: single plane
/// - 3D `(C, H, W)`: channels first, used when the first axis is small
/// - 3D `(H, W, C)`: channels last, used when the last axis is small
///
/// Supported data types: `f32`, `f64`, `u8`, `u16`, `i16`, `i32`.
/// Integer values are normalized to 0.0-1.0 range based on data type.
pub struct NpyLoader;

impl NpyLoader {
    /// NumPy magic bytes: \x93NUMPY
    const MAGIC: &'static [u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];

    /// Largest axis length still treated as a channel axis.
    const MAX_CHANNELS: usize = 16;

    fn array_to_plane<T>(array: ArrayD<T>) -> Result<Array2<f32>, LoaderError>
    where
        T: NumericConvert + Copy,
    {
        let array = array.mapv(T::to_normalized_f32);
        let shape = array.shape().to_vec();
        log::debug!("NpyLoader: array shape = {:?}", shape);

        match shape.len() {
            2 => array
                .into_dimensionality::<Ix2>()
                .map_err(|e| LoaderError::new(e.to_string())),
            3 => {
                let channel_axis = if shape[0] <= Self::MAX_CHANNELS && shape[0] < shape[2] {
                    0
                } else if shape[2] <= Self::MAX_CHANNELS && shape[2] < shape[0] {
                    2
                } else {
                    log::warn!(
                        "NpyLoader: ambiguous 3D shape {:?}, assuming (channels, height, width)",
                        shape
                    );
                    0
                };

                let plane = array
                    .mean_axis(Axis(channel_axis))
                    .ok_or_else(|| LoaderError::new("Array has an empty channel axis"))?;

                log::info!(
                    "NpyLoader: averaged {} channels into a {}x{} plane",
                    shape[channel_axis],
                    plane.shape()[1],
                    plane.shape()[0]
                );

                plane
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| LoaderError::new(e.to_string()))
            }
            _ => Err(LoaderError::new(format!(
                "Unsupported array dimensions: {} (expected 2 or 3)",
                shape.len()
            ))),
        }
    }
}

impl ImageLoader for NpyLoader {
    fn id(&self) -> &'static str {
        "npy"
    }

    fn display_name(&self) -> &'static str {
        "NumPy Array (.npy)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["npy"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        data.starts_with(Self::MAGIC)
    }

    fn load(&self, data: &[u8]) -> Result<Array2<f32>, LoaderError> {
        let mut cursor = Cursor::new(data);

        // f32 is most common for scientific data
        if let Ok(array) = ArrayD::<f32>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        cursor.set_position(0);
        if let Ok(array) = ArrayD::<f64>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        cursor.set_position(0);
        if let Ok(array) = ArrayD::<u16>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        cursor.set_position(0);
        if let Ok(array) = ArrayD::<u8>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        cursor.set_position(0);
        if let Ok(array) = ArrayD::<i16>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        cursor.set_position(0);
        if let Ok(array) = ArrayD::<i32>::read_npy(&mut cursor) {
            return Self::array_to_plane(array);
        }

        Err(LoaderError::new(
            "Failed to read NumPy array: unsupported dtype or invalid format",
        ))
    }

    fn priority(&self) -> i32 {
        10
    }
}

/// Trait for converting numeric types to normalized f32.
trait NumericConvert {
    fn to_normalized_f32(self) -> f32;
}

impl NumericConvert for f32 {
    fn to_normalized_f32(self) -> f32 {
        self
    }
}

impl NumericConvert for f64 {
    fn to_normalized_f32(self) -> f32 {
        self as f32
    }
}

impl NumericConvert for u8 {
    fn to_normalized_f32(self) -> f32 {
        f32::from(self) / 255.0
    }
}

impl NumericConvert for u16 {
    fn to_normalized_f32(self) -> f32 {
        f32::from(self) / 65535.0
    }
}

impl NumericConvert for i16 {
    fn to_normalized_f32(self) -> f32 {
        // Map -32768..32767 to 0..1
        (f32::from(self) + 32768.0) / 65535.0
    }
}

impl NumericConvert for i32 {
    fn to_normalized_f32(self) -> f32 {
        ((f64::from(self) + 2_147_483_648.0) / 4_294_967_295.0) as f32
    }
}
