//! Presentación de errores ubicados.
//!
//! Cualquier fase puede reportar uno o más errores con ubicación. Un
//! [`Diagnostics`] agrupa errores de una misma clase y los imprime junto
//! con un extracto del código fuente.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    /// Cambia la clase de error que precede a cada mensaje.
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| -> Box<dyn LocatedError> { Box::new(error) })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;
            excerpt(fmt, location)?;
            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(fmt, "Found {} {}", errors.len(), error_or_errors)
    }
}

/// Líneas afectadas con el rango de columnas subrayado.
fn excerpt(fmt: &mut fmt::Formatter<'_>, location: &Location) -> fmt::Result {
    let (start, end) = (location.start(), location.end());
    let digits = end.line().to_string().len();

    writeln!(fmt, "{:digits$} |", "", digits = digits)?;
    for line_number in start.line()..=end.line() {
        location.source().with_line(line_number, |line| {
            writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
        })?
    }

    // Un rango que termina en otra línea se subraya a partir de su inicio
    let to = end.column().saturating_sub(1);
    let (min, max) = (start.column().min(to), start.column().max(to));

    let skip = min.saturating_sub(1) as usize;
    let highlight = (max - min + 1) as usize;

    writeln!(
        fmt,
        "{:digits$} | {:skip$}{:^<highlight$}",
        "",
        "",
        "",
        digits = digits,
        skip = skip,
        highlight = highlight
    )
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("something broke")]
    struct Broken;

    #[test]
    fn batches_share_a_kind() {
        let source = Source::new(0, "test.oc");
        let errors = vec![
            Located::at(Broken, Location::point(&source, 1, 3)),
            Located::at(Broken, Location::point(&source, 2, 1)),
        ];

        let diagnostics = Diagnostics::from(errors).kind("semantic error");
        let text = diagnostics.to_string();

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(text.matches("semantic error: something broke").count(), 2);
        assert!(text.contains(" --> test.oc:1.3"));
        assert!(text.ends_with("Found 2 errors\n"));
    }

    #[test]
    fn empty_batches_say_so() {
        assert_eq!(
            Diagnostics::default().to_string(),
            "No errors were reported\n"
        );
    }
}
