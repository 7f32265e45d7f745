/// Grayscale frame borrowed for the duration of one call.
///
/// `buffer.len()` is the pixel length as reported by the producer and is not
/// required to equal `width * height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> Frame<'a> {
    /// Create a frame view over raw 8-bit intensities
    pub fn new(buffer: &'a [u8], width: usize, height: usize) -> Self {
        Self {
            buffer,
            width,
            height,
        }
    }

    /// Pixel bytes
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Pixel length in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when the frame carries no pixel bytes
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Frame width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Copy the pixels into an owned frame
    pub fn to_owned(&self) -> FrameBuf {
        FrameBuf::new(self.buffer.to_vec(), self.width, self.height)
    }
}

/// Owned frame as handed out by a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuf {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl FrameBuf {
    /// Wrap owned pixel bytes
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Borrow as a [`Frame`]
    pub fn as_frame(&self) -> Frame<'_> {
        Frame::new(&self.data, self.width, self.height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Give the pixel storage back
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
