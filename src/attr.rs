//! Conjuntos de atributos.
//!
//! Tanto los nodos de expresión como los símbolos se clasifican por un
//! conjunto plano de banderas. Las banderas de clase describen la forma
//! de un valor, las de rol describen cómo se usa un símbolo y los
//! calificadores describen propiedades de evaluación de una expresión.
//! La compatibilidad de tipos solo considera banderas de clase.

use std::fmt::{self, Display};

use bitflags::bitflags;

bitflags! {
    /// Clasificación de tipo, rol y calificadores.
    #[derive(Default)]
    pub struct Attributes: u32 {
        const VOID     = 1 << 0;
        const INT      = 1 << 1;
        const NULLPTR  = 1 << 2;
        const STRING   = 1 << 3;
        const STRUCT   = 1 << 4;
        const ARRAY    = 1 << 5;

        const FUNCTION = 1 << 6;
        const VARIABLE = 1 << 7;
        const FIELD    = 1 << 8;
        const TYPEID   = 1 << 9;
        const PARAM    = 1 << 10;
        const LOCAL    = 1 << 11;

        const LVAL     = 1 << 12;
        const CONST    = 1 << 13;
        const VREG     = 1 << 14;
        const VADDR    = 1 << 15;

        /// Banderas de clase.
        const KIND = Self::VOID.bits
            | Self::INT.bits
            | Self::NULLPTR.bits
            | Self::STRING.bits
            | Self::STRUCT.bits
            | Self::ARRAY.bits;

        /// Clases que admiten `nullptr`.
        const NULLABLE = Self::ARRAY.bits
            | Self::INT.bits
            | Self::STRING.bits
            | Self::STRUCT.bits;

        /// Clases que sobreviven a la indexación de un arreglo.
        const ELEMENT = Self::VOID.bits
            | Self::INT.bits
            | Self::NULLPTR.bits
            | Self::STRING.bits;
    }
}

/// Nombres de cada bandera individual, en orden de declaración.
const NAMES: &[(Attributes, &str)] = &[
    (Attributes::VOID, "void"),
    (Attributes::INT, "int"),
    (Attributes::NULLPTR, "null"),
    (Attributes::STRING, "string"),
    (Attributes::STRUCT, "struct"),
    (Attributes::ARRAY, "array"),
    (Attributes::FUNCTION, "function"),
    (Attributes::VARIABLE, "variable"),
    (Attributes::FIELD, "field"),
    (Attributes::TYPEID, "typeid"),
    (Attributes::PARAM, "param"),
    (Attributes::LOCAL, "local"),
    (Attributes::LVAL, "lval"),
    (Attributes::CONST, "const"),
    (Attributes::VREG, "vreg"),
    (Attributes::VADDR, "vaddr"),
];

impl Attributes {
    /// Subconjunto de banderas de clase.
    pub fn kind(self) -> Attributes {
        self & Attributes::KIND
    }

    /// Determina si un valor de tipo `other` puede ocupar un lugar de tipo `self`.
    ///
    /// Ambas clases deben ser idénticas, salvo que `other` sea un
    /// puntero nulo y `self` sea una clase que lo admite.
    pub fn compatible(self, other: Attributes) -> bool {
        self.kind() == other.kind()
            || (other.contains(Attributes::NULLPTR) && self.intersects(Attributes::NULLABLE))
    }

    /// Tipo de un elemento al indexar un arreglo.
    ///
    /// Se descartan también `STRUCT`, de modo que un arreglo de
    /// punteros a estructura produce elementos sin clase de estructura.
    pub fn element_type(self) -> Attributes {
        self & Attributes::ELEMENT
    }

    /// Nombres de las banderas activas, en orden de declaración.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|&(_, name)| name)
    }
}

/// Compatibilidad elemento a elemento de dos secuencias ordenadas.
pub fn compatible_sequence<A, B>(first: A, second: B) -> bool
where
    A: IntoIterator<Item = Attributes>,
    A::IntoIter: ExactSizeIterator,
    B: IntoIterator<Item = Attributes>,
    B::IntoIter: ExactSizeIterator,
{
    let (first, second) = (first.into_iter(), second.into_iter());
    first.len() == second.len() && first.zip(second).all(|(a, b)| a.compatible(b))
}

impl Display for Attributes {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        match names.next() {
            None => fmt.write_str("(none)"),
            Some(first) => {
                fmt.write_str(first)?;
                names.try_for_each(|name| write!(fmt, " {}", name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    type A = Attributes;

    #[rstest]
    #[case(A::VOID)]
    #[case(A::INT | A::VARIABLE | A::LVAL)]
    #[case(A::STRING | A::CONST)]
    #[case(A::STRUCT | A::FIELD)]
    #[case(A::ARRAY | A::INT | A::PARAM)]
    #[case(A::NULLPTR | A::CONST)]
    #[case(A::empty())]
    fn compatibility_is_reflexive(#[case] attributes: Attributes) {
        assert!(attributes.compatible(attributes));
    }

    #[rstest]
    #[case(A::ARRAY | A::STRING, true)]
    #[case(A::INT | A::VARIABLE, true)]
    #[case(A::STRING, true)]
    #[case(A::STRUCT | A::LVAL, true)]
    #[case(A::VOID, false)]
    fn nullptr_fits_nullable_kinds(#[case] target: Attributes, #[case] expected: bool) {
        assert_eq!(target.compatible(A::NULLPTR | A::CONST), expected);
    }

    #[test]
    fn roles_and_qualifiers_are_ignored() {
        let param = A::INT | A::VARIABLE | A::PARAM | A::LVAL;
        let literal = A::INT | A::CONST;
        assert!(param.compatible(literal));
        assert!(literal.compatible(param));

        assert!(!A::INT.compatible(A::STRING));
        assert!(!(A::ARRAY | A::INT).compatible(A::INT));
    }

    #[test]
    fn element_type_drops_struct() {
        let strings = A::ARRAY | A::STRING | A::VARIABLE | A::LVAL;
        assert_eq!(strings.element_type(), A::STRING);

        let structs = A::ARRAY | A::STRUCT | A::VARIABLE | A::LVAL;
        assert_eq!(structs.element_type(), A::empty());
    }

    #[test]
    fn sequences_must_match_in_length_and_order() {
        let ints = [A::INT | A::PARAM, A::STRING | A::PARAM];
        assert!(compatible_sequence(ints, [A::INT, A::STRING]));
        assert!(!compatible_sequence(ints, [A::STRING, A::INT]));
        assert!(!compatible_sequence(ints, [A::INT]));
        assert!(compatible_sequence(Vec::<A>::new(), Vec::<A>::new()));
    }

    #[test]
    fn display_uses_declaration_order() {
        let attributes = A::LVAL | A::INT | A::VARIABLE;
        assert_eq!(attributes.to_string(), "int variable lval");
        assert_eq!(A::empty().to_string(), "(none)");
    }
}
