//! QR images and printable ticket PDFs.
//!
//! Every page is 200 x 80 mm: optional full-bleed background, three lines of
//! text on the left and the QR code centred in the right-hand stub.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Luma};
use printpdf::image_crate;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Rgb,
};
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

const PAGE_WIDTH_MM: f32 = 200.0;
const PAGE_HEIGHT_MM: f32 = 80.0;
const QR_PX: u32 = 256;
const QR_SIZE_MM: f32 = 40.0;
const QR_X_MM: f32 = 153.0;
const QR_Y_MM: f32 = 19.0;
const TEXT_X_MM: f32 = 35.0;
const TEXT_TOP_MM: f32 = 43.5;
const LINE_SPACING_MM: f32 = 7.0;
const FONT_SIZE: f32 = 12.0;
const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to load background {path}: {message}")]
    Background { path: PathBuf, message: String },

    #[error("PDF composition failed: {0}")]
    Pdf(String),

    #[error("a ticket needs at least one page")]
    Empty,
}

/// Event details printed on every page.
#[derive(Debug, Clone, Default)]
pub struct RenderConfig {
    pub event_date: String,
    pub venue: String,
    /// PNG drawn behind each page.
    pub background: Option<PathBuf>,
}

impl RenderConfig {
    /// Read `EVENT_DATE`, `EVENT_VENUE` and `TICKET_BACKGROUND`.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            event_date: var("EVENT_DATE").unwrap_or_default(),
            venue: var("EVENT_VENUE").unwrap_or_default(),
            background: var("TICKET_BACKGROUND").map(PathBuf::from),
        }
    }
}

/// One page of a ticket PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPage {
    /// Printed after "Invitado: ".
    pub holder: String,
    /// Encoded in the QR image.
    pub code: String,
}

/// PNG bytes per page, in page order, plus the composed PDF.
#[derive(Debug, Clone)]
pub struct RenderedTicket {
    pub qr_codes: Vec<Vec<u8>>,
    pub pdf: Vec<u8>,
}

#[derive(Clone)]
pub struct Renderer {
    config: RenderConfig,
    background: Option<Arc<image_crate::DynamicImage>>,
}

impl Renderer {
    /// Load the background image, if one is configured.
    pub fn new(config: RenderConfig) -> Result<Self, RenderError> {
        let background = match &config.background {
            Some(path) => {
                let image = image_crate::open(path).map_err(|e| RenderError::Background {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                Some(Arc::new(image))
            }
            None => None,
        };
        Ok(Self { config, background })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Encode `data` as a PNG QR code.
    pub fn qr_png(&self, data: &str) -> Result<Vec<u8>, RenderError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_PX, QR_PX)
            .build();

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Render one QR per page and a PDF holding every page.
    pub fn render(&self, title: &str, pages: &[TicketPage]) -> Result<RenderedTicket, RenderError> {
        if pages.is_empty() {
            return Err(RenderError::Empty);
        }

        let qr_codes = pages
            .iter()
            .map(|page| self.qr_png(&page.code))
            .collect::<Result<Vec<_>, _>>()?;

        let (doc, first_page, first_layer) = PdfDocument::new(
            title,
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Ticket",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        for (index, (page, qr)) in pages.iter().zip(&qr_codes).enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page_index, layer_index) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Ticket");
                doc.get_page(page_index).get_layer(layer_index)
            };
            self.draw_page(&layer, &font, page, qr)?;
        }

        let pdf = doc
            .save_to_bytes()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        Ok(RenderedTicket { qr_codes, pdf })
    }

    fn draw_page(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        page: &TicketPage,
        qr_png: &[u8],
    ) -> Result<(), RenderError> {
        let text_color = match &self.background {
            Some(background) => {
                let dpi = background.width() as f32 * MM_PER_INCH / PAGE_WIDTH_MM;
                let natural_height = background.height() as f32 * MM_PER_INCH / dpi;
                Image::from_dynamic_image(background).add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(Mm(0.0)),
                        translate_y: Some(Mm(0.0)),
                        scale_y: Some(PAGE_HEIGHT_MM / natural_height),
                        dpi: Some(dpi),
                        ..Default::default()
                    },
                );
                Rgb::new(1.0, 1.0, 1.0, None)
            }
            None => Rgb::new(0.0, 0.0, 0.0, None),
        };

        layer.set_fill_color(Color::Rgb(text_color));
        let lines = [
            format!("Invitado: {}", page.holder),
            format!("Fecha: {}", self.config.event_date),
            format!("Lugar: {}", self.config.venue),
        ];
        for (i, line) in lines.iter().enumerate() {
            let y = TEXT_TOP_MM - LINE_SPACING_MM * i as f32;
            layer.use_text(line.as_str(), FONT_SIZE, Mm(TEXT_X_MM), Mm(y), font);
        }

        let qr = image_crate::load_from_memory(qr_png)
            .map_err(|e| RenderError::Pdf(format!("QR image: {e}")))?;
        let dpi = qr.width() as f32 * MM_PER_INCH / QR_SIZE_MM;
        Image::from_dynamic_image(&qr).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(QR_X_MM)),
                translate_y: Some(Mm(QR_Y_MM)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );

        Ok(())
    }
}
