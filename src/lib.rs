//! Back end de análisis semántico y generación de código intermedio
//! para el lenguaje oc.
//!
//! # Front end
//! Cada unidad de compilación deriva de un único archivo de código
//! fuente. Este archivo se somete primero a análisis léxico en [`lex`],
//! de lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un árbol sintáctico ([`ast`]) por medio de análisis
//! sintáctico en [`parse`].
//!
//! # Análisis semántico
//! El árbol es recorrido en [`semantic`], que resuelve nombres contra
//! las tablas de [`symbol`], clasifica cada expresión con los atributos
//! de [`attr`] y acumula errores de tipo. El resultado es un
//! [`semantic::Analysis`], que además produce el reporte de símbolos.
//!
//! # Código intermedio
//! Un segundo recorrido, independiente del primero, emite un listado de
//! tres direcciones descrito en [`ir`] por medio de [`generate`]. Este
//! recorrido se guía únicamente por la forma del árbol.

#[macro_use]
mod macros;

pub mod ast;
pub mod attr;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod symbol;

mod codegen;

pub use codegen::generate;
