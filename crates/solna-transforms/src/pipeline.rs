#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use solna_core::Result;

/// Data flowing through the transform pipeline.
pub enum TransformData {
    /// XML markup (for XML-aware transforms).
    Xml { xml_text: String },
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to bytes. XML markup is emitted as-is.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            TransformData::Xml { xml_text } => xml_text.into_bytes(),
            TransformData::Binary(data) => data,
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Remove all transforms.
    pub fn clear(&mut self) {
        self.transforms.clear();
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData> {
        let mut data = input;
        for transform in &self.transforms {
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
