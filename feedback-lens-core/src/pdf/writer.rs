use super::{DocumentLayout, Element, Font, Placement, Rect, TextRun};
use feedback_lens_common::{FeedbackLensError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

const ASCENT: f32 = 0.718; // Helvetica ascender, em fraction
const JPEG_QUALITY: u8 = 90;

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

fn render_err(e: impl std::fmt::Display) -> FeedbackLensError {
    FeedbackLensError::Render(format!("pdf serialization failed: {e}"))
}

/// WinAnsi bytes; the layout only carries Latin-1 text.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u32 as u8 } else { b'?' })
        .collect()
}

/// Serialize a layout into PDF bytes using the standard Helvetica faces.
pub fn write_pdf(layout: &DocumentLayout) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let height = layout.page_height;
    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let mut ops: Vec<Operation> = Vec::new();
        let mut xobjects = Dictionary::new();
        let mut image_no = 0;
        for element in &page.elements {
            match element {
                Element::Text(run) => push_text(&mut ops, run, height),
                Element::Rect(rect) => push_rect(&mut ops, rect, height),
                Element::Image(placement) => {
                    image_no += 1;
                    let name = format!("Im{image_no}");
                    let image_id = add_image(&mut doc, placement)?;
                    xobjects.set(name.as_bytes().to_vec(), image_id);
                    push_image(&mut ops, placement, &name, height);
                }
            }
        }
        let content = Content { operations: ops }.encode().map_err(render_err)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => regular_id,
                    "F2" => bold_id,
                },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), real(layout.page_width), real(height)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(encode_text(&layout.title), StringFormat::Literal),
        "Producer" => Object::string_literal("feedback-lens"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(render_err)?;
    Ok(buf)
}

fn push_text(ops: &mut Vec<Operation>, run: &TextRun, page_height: f32) {
    let font = match run.font {
        Font::Regular => "F1",
        Font::Bold => "F2",
    };
    let baseline = page_height - run.y - run.size * ASCENT;
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), real(run.size)]));
    ops.push(Operation::new("Td", vec![real(run.x), real(baseline)]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_text(&run.text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn push_rect(ops: &mut Vec<Operation>, rect: &Rect, page_height: f32) {
    let bottom = page_height - rect.y - rect.height;
    ops.push(Operation::new("w", vec![real(0.5)]));
    ops.push(Operation::new(
        "re",
        vec![real(rect.x), real(bottom), real(rect.width), real(rect.height)],
    ));
    ops.push(Operation::new("S", vec![]));
}

fn push_image(ops: &mut Vec<Operation>, p: &Placement, name: &str, page_height: f32) {
    let bottom = page_height - p.y - p.height;
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![real(p.width), real(0.0), real(0.0), real(p.height), real(p.x), real(bottom)],
    ));
    ops.push(Operation::new("Do", vec![name.into()]));
    ops.push(Operation::new("Q", vec![]));
}

// images are embedded as baseline JPEG (DCTDecode)
fn add_image(doc: &mut Document, p: &Placement) -> Result<ObjectId> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .write_image(
            p.image.as_raw(),
            p.image.width(),
            p.image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| FeedbackLensError::Render(format!("jpeg encoding failed: {e}")))?;
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => p.image.width() as i64,
        "Height" => p.image.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    Ok(doc.add_object(Stream::new(dict, jpeg)))
}
