//! Raw frames to network observations.
//!
//! A raw frame is scaled from `[0, 255]` to `[0, 1]` and resampled with a
//! triangle (bilinear) filter to the network's `(height, width)`.
//! [`FrameStack`] then assembles consecutive frames into one observation.

use std::collections::VecDeque;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use crate::batch::Observation;
use crate::config::InputShape;
use crate::error::{DqnError, Result};

type GrayFrame = ImageBuffer<Luma<f32>, Vec<f32>>;
type RgbFrame = ImageBuffer<Rgb<f32>, Vec<f32>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preprocessor {
    shape: InputShape,
}

impl Preprocessor {
    /// Fails when a target dimension is zero or does not fit an image side
    pub fn new(shape: InputShape) -> Result<Self> {
        if shape.frames == 0 || shape.height == 0 || shape.width == 0 {
            return Err(DqnError::shape(format!("input shape {:?} has a zero dimension", shape.dims())));
        }
        if u32::try_from(shape.height).is_err() || u32::try_from(shape.width).is_err() {
            return Err(DqnError::shape(format!(
                "target frame ({}, {}) is too large",
                shape.height, shape.width
            )));
        }
        Ok(Preprocessor { shape })
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    /// Normalise and resize one grayscale frame of `(rows, cols)` pixels.
    /// The result is always `(height, width)` with values in `[0, 1]`.
    pub fn preprocess<T>(&self, raw: ArrayView2<T>) -> Result<Array2<f32>>
    where
        T: Copy + Into<f32>,
    {
        let (rows, cols) = raw.dim();
        let (width, height) = image_dims(rows, cols)?;
        let pixels: Vec<f32> = raw.iter().map(|&p| Into::<f32>::into(p) / 255.0).collect();
        let frame = GrayFrame::from_raw(width, height, pixels).ok_or_else(|| too_large(rows, cols))?;
        self.resize(&frame)
    }

    /// Like [`Preprocessor::preprocess`] for `(rows, cols, 3)` RGB frames,
    /// which are reduced to luminance by [`imageops::grayscale`] first
    pub fn preprocess_rgb<T>(&self, raw: ArrayView3<T>) -> Result<Array2<f32>>
    where
        T: Copy + Into<f32>,
    {
        let (rows, cols, channels) = raw.dim();
        if channels != 3 {
            return Err(DqnError::shape(format!("RGB frame needs 3 channels, got {}", channels)));
        }
        let (width, height) = image_dims(rows, cols)?;
        let pixels: Vec<f32> = raw.iter().map(|&p| Into::<f32>::into(p) / 255.0).collect();
        let frame = RgbFrame::from_raw(width, height, pixels).ok_or_else(|| too_large(rows, cols))?;
        self.resize(&imageops::grayscale(&frame))
    }

    // f32 pixels are clamped to [0, 1] by the resampler, so scaling happens
    // before this point.
    fn resize(&self, frame: &GrayFrame) -> Result<Array2<f32>> {
        let resized = imageops::resize(frame, self.shape.width as u32, self.shape.height as u32, FilterType::Triangle);
        let mut output = Array2::from_shape_vec((self.shape.height, self.shape.width), resized.into_raw())?;
        output.mapv_inplace(|v| v.clamp(0.0, 1.0));
        Ok(output)
    }
}

fn too_large(rows: usize, cols: usize) -> DqnError {
    DqnError::shape(format!("raw frame ({}, {}) is too large", rows, cols))
}

// `image` takes (width, height): width counts columns.
fn image_dims(rows: usize, cols: usize) -> Result<(u32, u32)> {
    if rows == 0 || cols == 0 {
        return Err(DqnError::shape(format!("raw frame ({}, {}) is empty", rows, cols)));
    }
    let width = u32::try_from(cols).map_err(|_| too_large(rows, cols))?;
    let height = u32::try_from(rows).map_err(|_| too_large(rows, cols))?;
    Ok((width, height))
}

/// The most recent `frames` preprocessed frames, oldest first
#[derive(Clone, Debug)]
pub struct FrameStack {
    shape: InputShape,
    frames: VecDeque<Array2<f32>>,
}

impl FrameStack {
    pub fn new(shape: InputShape) -> Self {
        FrameStack {
            shape,
            frames: VecDeque::with_capacity(shape.frames),
        }
    }

    /// Append a `(height, width)` frame, evicting the oldest once full
    pub fn push(&mut self, frame: Array2<f32>) -> Result<()> {
        let expected = (self.shape.height, self.shape.width);
        if frame.dim() != expected {
            return Err(DqnError::shape(format!(
                "frame has shape {:?}, expected {:?}",
                frame.dim(),
                expected
            )));
        }
        if self.frames.len() == self.shape.frames {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.shape.frames
    }

    /// Forget all frames, e.g. at the start of an episode
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// The stacked `(frames, height, width)` observation. Until the stack is
    /// full the oldest frame is repeated in front.
    pub fn observation(&self) -> Result<Observation> {
        let first = self
            .frames
            .front()
            .ok_or_else(|| DqnError::shape("frame stack is empty"))?;
        let padding = self.shape.frames.saturating_sub(self.frames.len());
        let views: Vec<ArrayView2<f32>> = std::iter::repeat(first.view())
            .take(padding)
            .chain(self.frames.iter().map(|f| f.view()))
            .collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}
