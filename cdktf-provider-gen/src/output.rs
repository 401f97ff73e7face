//! Rendering of command results in a user selected format

use std::fmt;
use std::io::Write;

use cdktfgen::PipelineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Plain, unformatted JSON
    Json,
    /// Indented JSON
    Pretty,
    /// The display string
    #[default]
    Text,
    /// Nothing at all
    None,
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// Returned by a [`Renderer`] for formats it leaves to the default
    #[error("renderer does not implement this format")]
    Unimplemented,

    #[error("encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Custom rendering for a type
///
/// Formats an implementation doesn't handle should report
/// [`RenderError::Unimplemented`] so [`render`] falls back to the default.
pub trait Renderer {
    fn render(&self, _w: &mut dyn Write, _format: Format) -> Result<(), RenderError> {
        Err(RenderError::Unimplemented)
    }
}

/// Write `value` to `w` in `format`
pub fn render<T>(w: &mut dyn Write, format: Format, value: &T) -> Result<(), RenderError>
where
    T: Renderer + fmt::Display + ?Sized,
{
    match value.render(w, format) {
        Err(RenderError::Unimplemented) => {}
        done => return done,
    }

    match format {
        Format::Json => {
            serde_json::to_writer(&mut *w, &value.to_string())?;
            writeln!(w)?;
        }
        Format::Pretty => {
            serde_json::to_writer_pretty(&mut *w, &value.to_string())?;
            writeln!(w)?;
        }
        Format::Text => writeln!(w, "{}", value.to_string().trim())?,
        Format::None => {}
    }
    Ok(())
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    stage: &'a str,
    error: String,
}

impl Renderer for PipelineError {
    fn render(&self, w: &mut dyn Write, format: Format) -> Result<(), RenderError> {
        let report = ErrorReport {
            stage: self.stage.as_str(),
            error: self.source.to_string(),
        };

        match format {
            Format::Json => serde_json::to_writer(&mut *w, &report)?,
            Format::Pretty => serde_json::to_writer_pretty(&mut *w, &report)?,
            _ => return Err(RenderError::Unimplemented),
        }
        writeln!(w)?;
        Ok(())
    }
}
