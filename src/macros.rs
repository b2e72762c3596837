/// Agrega una instrucción al contexto de generación.
///
/// La instrucción toma la etiqueta pendiente, si existe. Las variantes de
/// [`crate::ir::Instruction`] se pueden nombrar sin calificar.
macro_rules! emit {
    ($context:expr, $($instruction:tt)*) => {{
        #[allow(unused_imports)]
        use crate::ir::Instruction::*;

        $context.push($($instruction)*)
    }};
}

/// Retorna del generador con un error de forma para un nodo inesperado.
macro_rules! unexpected {
    ($node:expr) => {
        return Err($node.unexpected())
    };
}
