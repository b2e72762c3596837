//! Reducción de expresiones a operandos de tres direcciones.

use std::rc::Rc;

use log::{debug, trace};

use super::Context;
use crate::{
    ast::{Node, Shape, Tag},
    ir::{Guard, Operand, Rvalue, Type},
};

/// Tipo textual de un declarador o de un operando de `alloc`.
pub(super) fn type_of(node: &Node) -> Shape<Type> {
    let of = match node.tag() {
        Tag::Void => Type::Void,
        Tag::Int => Type::Int,
        Tag::String => Type::String,
        Tag::TypeId => Type::Struct(node.lexeme().into()),
        Tag::Ptr => Type::Ptr(node.child(0)?.lexeme().into()),
        Tag::Array => Type::Array(Box::new(type_of(node.child(0)?)?)),
        _ => unexpected!(node),
    };

    Ok(of)
}

impl Context {
    /// Reduce una expresión a un operando.
    ///
    /// Los operandos atómicos se retornan tal cual. Una expresión
    /// compuesta evalúa primero sus operandos, de izquierda a derecha,
    /// y luego deposita su resultado en un temporal nuevo.
    pub(super) fn value(&mut self, node: &Node) -> Shape<Operand> {
        let rvalue = match node.tag() {
            Tag::Ident | Tag::IntCon | Tag::CharCon | Tag::StringCon | Tag::NullPtr => {
                return self.atom(node)
            }

            Tag::Arrow => {
                let (base, field) = node.pair()?;
                let base = self.value(base)?;
                return Ok(Operand::Field(Box::new(base), field.lexeme().into()));
            }

            Tag::Assign => {
                return match self.assignment(node)? {
                    Some(target) => Ok(target),
                    None => self.value(node.child(1)?),
                }
            }

            Tag::Add
            | Tag::Sub
            | Tag::Mul
            | Tag::Div
            | Tag::Rem
            | Tag::Eq
            | Tag::Ne
            | Tag::Lt
            | Tag::Le
            | Tag::Gt
            | Tag::Ge => {
                let (left, right) = node.pair()?;
                let left = self.value(left)?;
                let right = self.value(right)?;

                Rvalue::Binary(left, operator(node)?, right)
            }

            Tag::Pos | Tag::Neg | Tag::Not => {
                let operand = self.value(node.child(0)?)?;
                Rvalue::Unary(operator(node)?, operand)
            }

            Tag::Index => {
                let (base, index) = node.pair()?;
                let base = self.value(base)?;
                let index = self.value(index)?;

                Rvalue::Index(base, index)
            }

            Tag::Call => {
                let (function, arguments) = self.call(node)?;
                Rvalue::Call(function, arguments)
            }

            Tag::Alloc => {
                let of = type_of(node.child(0)?)?;
                let size = node
                    .optional(1)
                    .map(|size| self.value(size))
                    .transpose()?;

                Rvalue::Malloc(of, size)
            }

            _ => unexpected!(node),
        };

        let temp = self.temp();
        trace!("$t{} = {}", temp, rvalue);

        emit!(self, Assign(Operand::Temp(temp), rvalue));
        Ok(Operand::Temp(temp))
    }

    /// Forma textual de un operando que no requiere evaluación.
    pub(super) fn atom(&mut self, node: &Node) -> Shape<Operand> {
        let atom = match node.tag() {
            Tag::Ident => Operand::Name(node.lexeme().into()),
            Tag::IntCon | Tag::CharCon | Tag::StringCon | Tag::NullPtr => {
                Operand::Literal(node.lexeme().into())
            }

            Tag::Arrow => {
                let (base, field) = node.pair()?;
                Operand::Field(Box::new(self.atom(base)?), field.lexeme().into())
            }

            _ => unexpected!(node),
        };

        Ok(atom)
    }

    /// Emite una asignación y retorna su destino.
    ///
    /// Destinos que no son un identificador ni un acceso a campo se
    /// omiten sin emitir nada.
    pub(super) fn assignment(&mut self, node: &Node) -> Shape<Option<Operand>> {
        let (target, value) = node.pair()?;

        let target = match target.tag() {
            Tag::Ident | Tag::Arrow => self.atom(target)?,
            _ => {
                debug!("skipping assignment to `{}` at {}", target.tag(), target.location());
                return Ok(None);
            }
        };

        let value = self.value(value)?;
        emit!(self, Assign(target.clone(), Rvalue::Value(value)));

        Ok(Some(target))
    }

    pub(super) fn call(&mut self, node: &Node) -> Shape<(Rc<str>, Vec<Operand>)> {
        let function = node.child(0)?;
        if function.tag() != Tag::Ident {
            unexpected!(function);
        }

        let arguments = node.children()[1..]
            .iter()
            .map(|argument| self.atom(argument))
            .collect::<Shape<Vec<_>>>()?;

        Ok((function.lexeme().into(), arguments))
    }

    /// Condición bajo la cual un `if` o `while` salta fuera de su cuerpo.
    ///
    /// La polaridad se invierte respecto a la condición original.
    pub(super) fn guard(&mut self, condition: &Node) -> Shape<Guard> {
        let guard = match condition.tag() {
            Tag::Eq | Tag::Ne => {
                let (left, right) = condition.pair()?;
                let left = self.value(left)?;
                let right = self.value(right)?;

                let inverse = if condition.tag() == Tag::Eq { "!=" } else { "==" };
                Guard::Compare(left, inverse, right)
            }

            Tag::Not => Guard::Holds(self.value(condition.child(0)?)?),

            _ => match self.value(condition)? {
                temp @ Operand::Temp(_) => Guard::Fails(temp),
                other => {
                    let temp = self.temp();
                    emit!(self, Assign(Operand::Temp(temp), Rvalue::Value(other)));
                    Guard::Fails(Operand::Temp(temp))
                }
            },
        };

        Ok(guard)
    }
}

fn operator(node: &Node) -> Shape<&'static str> {
    node.tag().operator().ok_or_else(|| node.unexpected())
}
