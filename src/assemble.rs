//! Packs encoded pages into a PDF, one full-bleed image per page.
//!
//! JPEG data is embedded as-is with `DCTDecode`, so assembly never re-encodes
//! and never loses quality.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::path::Path;

use crate::encode::EncodedPage;
use crate::error::CompressError;

/// Turns an ordered sequence of encoded pages into a PDF file.
pub trait PageAssembler {
    /// Write `pages`, in order, to `output`. `dpi` is the resolution the pages
    /// were rendered at and fixes the physical page size.
    fn assemble(&self, pages: Vec<EncodedPage>, dpi: u32, output: &Path) -> Result<(), CompressError>;
}

/// Assembler built on `lopdf`.
#[derive(Debug, Clone)]
pub struct LopdfAssembler {
    /// Flate-compress the page content streams
    pub compress_streams: bool,
}

impl Default for LopdfAssembler {
    fn default() -> Self {
        Self {
            compress_streams: true,
        }
    }
}

impl LopdfAssembler {
    /// Build the document in memory.
    pub fn build(&self, pages: Vec<EncodedPage>, dpi: u32) -> Result<Document, CompressError> {
        if pages.is_empty() {
            return Err(CompressError::AssemblyFailure("no pages to assemble".to_string()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        let page_count = pages.len();

        for page in pages {
            let width_pt = points(page.width, dpi);
            let height_pt = points(page.height, dpi);

            let image_id = doc.add_object(Object::Stream(image_stream(page)));

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            width_pt.into(),
                            0.into(),
                            0.into(),
                            height_pt.into(),
                            0.into(),
                            0.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_bytes = content
                .encode()
                .map_err(|e| CompressError::AssemblyFailure(format!("content stream: {}", e)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        "Im0" => image_id,
                    },
                },
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        // Streams that already carry a filter (the JPEGs) are left alone
        if self.compress_streams {
            doc.compress();
        }

        Ok(doc)
    }
}

impl PageAssembler for LopdfAssembler {
    fn assemble(&self, pages: Vec<EncodedPage>, dpi: u32, output: &Path) -> Result<(), CompressError> {
        let mut doc = self.build(pages, dpi)?;
        doc.save(output)
            .map_err(|e| CompressError::AssemblyFailure(format!("{}: {}", output.display(), e)))?;
        Ok(())
    }
}

fn points(pixels: u32, dpi: u32) -> f32 {
    pixels as f32 * 72.0 / dpi.max(1) as f32
}

fn image_stream(page: EncodedPage) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(page.width as i64));
    dict.set("Height", Object::Integer(page.height as i64));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Length", Object::Integer(page.jpeg.len() as i64));

    let mut stream = Stream::new(dict, page.jpeg);
    stream.allows_compression = false;
    stream
}
