//! Generación de código intermedio.
//!
//! El generador recorre el árbol por segunda vez, guiado únicamente por
//! la etiqueta sintáctica de cada nodo. No consulta resultados del
//! análisis semántico. Todo el estado mutable de una corrida vive en un
//! [`Context`], por lo que corridas distintas nunca interfieren.

use std::rc::Rc;

use log::{debug, trace};

use crate::{
    ast::{Ast, Node, Shape, Tag},
    ir::{Instruction, Label, Line, Listing, Operand, Rvalue, Type},
};

mod expr;

/// Genera el listado IR de una unidad de compilación.
pub fn generate(ast: &Ast) -> Shape<Listing> {
    let mut context = Context::default();
    context.statement(ast.root())?;
    context.flush();

    debug!(
        "generated {} lines, {} temporaries",
        context.lines.len(),
        context.temps
    );

    Ok(Listing {
        lines: context.lines,
    })
}

/// Estado de una corrida de generación.
#[derive(Debug, Default)]
pub struct Context {
    temps: u32,
    strings: u32,
    ifs: u32,
    whiles: u32,
    pending: Option<Label>,
    in_function: bool,
    lines: Vec<Line>,
}

impl Context {
    /// Agrega una instrucción con la etiqueta pendiente, si existe.
    fn push(&mut self, instruction: Instruction) {
        self.lines.push(Line {
            label: self.pending.take(),
            instruction,
        });
    }

    /// Fija la etiqueta de la siguiente instrucción.
    ///
    /// Si otra etiqueta seguía pendiente, esta se emite en una línea
    /// propia para no perder el destino de salto.
    fn label(&mut self, label: Label) {
        self.flush();
        self.pending = Some(label);
    }

    fn flush(&mut self) {
        if self.pending.is_some() {
            emit!(self, Nop);
        }
    }

    fn temp(&mut self) -> u32 {
        let temp = self.temps;
        self.temps += 1;
        temp
    }

    fn statement(&mut self, node: &Node) -> Shape<()> {
        match node.tag() {
            Tag::Root | Tag::Block => node
                .children()
                .iter()
                .try_for_each(|child| self.statement(child)),

            Tag::Function => self.function(node),
            Tag::Prototype => Ok(()),
            Tag::Struct => self.structure(node),
            Tag::VarDecl => self.declaration(node),
            Tag::If => self.branch(node),
            Tag::While => self.repeat(node),

            Tag::Return => {
                let value = node
                    .optional(0)
                    .map(|value| self.value(value))
                    .transpose()?;

                emit!(self, Return(value));
                Ok(())
            }

            Tag::Assign => self.assignment(node).map(drop),

            Tag::Call => {
                let (function, arguments) = self.call(node)?;
                emit!(self, Call(function, arguments));
                Ok(())
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
            | Tag::Ge
            | Tag::Pos
            | Tag::Neg
            | Tag::Not
            | Tag::Index
            | Tag::Alloc => self.value(node).map(drop),

            // Sin efectos
            Tag::Arrow
            | Tag::Ident
            | Tag::IntCon
            | Tag::CharCon
            | Tag::StringCon
            | Tag::NullPtr => Ok(()),

            Tag::Params
            | Tag::Void
            | Tag::Int
            | Tag::String
            | Tag::Ptr
            | Tag::Array
            | Tag::TypeId
            | Tag::DeclId
            | Tag::Field => unexpected!(node),
        }
    }

    fn function(&mut self, node: &Node) -> Shape<()> {
        let declarator = node.child(0)?;
        let params = node.child(1)?;
        let body = node.child(2)?;

        let name = declarator.declared_name()?;
        debug!("generating function `{}`", name.lexeme());

        self.label(Label::Named(name.lexeme().into()));
        emit!(self, Function(expr::type_of(declarator)?));

        if params.tag() != Tag::Params {
            unexpected!(params);
        }

        for param in params.children() {
            let of = expr::type_of(param)?;
            emit!(self, Param(of, param.declared_name()?.lexeme().into()));
        }

        self.in_function = true;
        self.statement(body)?;
        self.in_function = false;

        emit!(self, Return(None));
        emit!(self, End);

        Ok(())
    }

    fn structure(&mut self, node: &Node) -> Shape<()> {
        let tag = node.child(0)?;
        let fields = node.child(1)?;

        emit!(self, Struct(tag.lexeme().into()));
        for field in fields.children() {
            let of = expr::type_of(field)?;
            emit!(self, Field(of, field.declared_name()?.lexeme().into()));
        }

        emit!(self, End);
        Ok(())
    }

    fn declaration(&mut self, node: &Node) -> Shape<()> {
        let declarator = node.child(0)?;
        let initializer = node.optional(1);

        let name: Rc<str> = declarator.declared_name()?.lexeme().into();
        let of = expr::type_of(declarator)?;
        let pointer = declarator.tag() == Tag::Ptr;

        match initializer {
            // Los literales globales se emiten como un bloque de datos etiquetado
            Some(literal) if !self.in_function && !pointer && literal.tag().is_literal() => {
                let value = match literal.tag() {
                    Tag::StringCon => Operand::Label(self.string(literal)),
                    _ => Operand::Literal(literal.lexeme().into()),
                };

                self.label(Label::Named(name));
                emit!(self, Data(of, value));
                return Ok(());
            }

            _ if self.in_function => emit!(self, Local(of, Rc::clone(&name))),
            _ => emit!(self, Global(of, Rc::clone(&name))),
        }

        if pointer {
            let tag = declarator.child(0)?.lexeme();
            let malloc = Rvalue::Malloc(Type::Struct(tag.into()), None);
            emit!(self, Assign(Operand::Name(Rc::clone(&name)), malloc));
        }

        match initializer {
            Some(value) if !(pointer && value.tag() == Tag::Alloc) => {
                let value = self.value(value)?;
                emit!(self, Assign(Operand::Name(name), Rvalue::Value(value)));
            }

            _ => (),
        }

        Ok(())
    }

    /// Reserva una etiqueta `.s<k>` para un literal de cadena.
    fn string(&mut self, literal: &Node) -> Label {
        let label = Label::Str(self.strings);
        self.strings += 1;

        self.label(label.clone());
        emit!(self, Str(literal.lexeme().into()));

        label
    }

    fn branch(&mut self, node: &Node) -> Shape<()> {
        let number = self.ifs;
        self.ifs += 1;

        let condition = node.child(0)?;
        let then = node.child(1)?;

        trace!("lowering if #{}", number);
        self.label(Label::If(number));
        let guard = self.guard(condition)?;

        match node.optional(2) {
            None => {
                emit!(self, GotoIf(Label::Fi(number), guard));
                self.label(Label::Then(number));
                self.statement(then)?;
            }

            Some(otherwise) => {
                emit!(self, GotoIf(Label::Else(number), guard));
                self.label(Label::Then(number));
                self.statement(then)?;

                emit!(self, Goto(Label::Fi(number)));
                self.label(Label::Else(number));
                self.statement(otherwise)?;
            }
        }

        self.label(Label::Fi(number));
        Ok(())
    }

    fn repeat(&mut self, node: &Node) -> Shape<()> {
        let number = self.whiles;
        self.whiles += 1;

        let (condition, body) = node.pair()?;

        trace!("lowering while #{}", number);
        self.label(Label::While(number));
        let guard = self.guard(condition)?;
        emit!(self, GotoIf(Label::Od(number), guard));

        self.label(Label::Do(number));
        self.statement(body)?;

        emit!(self, Goto(Label::While(number)));
        self.label(Label::Od(number));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwritten_labels_are_flushed() {
        let mut context = Context::default();
        context.label(Label::Then(0));
        context.label(Label::Fi(0));
        emit!(context, Return(None));

        let listing = Listing {
            lines: context.lines,
        };

        assert_eq!(listing.to_string(), ".th0:\n.fi0:     return\n");
    }

    #[test]
    fn temporaries_are_sequential() {
        let mut context = Context::default();
        assert_eq!((context.temp(), context.temp(), context.temp()), (0, 1, 2));
    }
}
