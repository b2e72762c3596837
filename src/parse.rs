//! Análisis sintáctico.
//!
//! Parser de descenso recursivo que dispone un flujo de tokens en un
//! [`Ast`]. Cada regla puede fallar de forma débil, lo cual indica que la
//! regla no aplica y que otra alternativa puede intentarse, o de forma
//! estricta, lo cual indica un error definitivo de sintaxis.

use std::{io::BufRead, iter::Peekable, slice};
use thiserror::Error;

use crate::{
    ast::{Ast, Node, Tag},
    error::Diagnostics,
    lex::{Keyword, Lexer, Token},
    source::{self, Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected token {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected token {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected any of `void`, `int`, `string`, `ptr`, `array`")]
    ExpectedType,

    #[error("Array elements must be `int`, `string` or `ptr`")]
    ExpectedElementType,

    #[error("Expected any of `struct`, `string`, `array` in allocation")]
    ExpectedAllocation,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Call arguments must be identifiers, literals or field accesses")]
    ExpectedArgument,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

/// Lee, escanea y parsea un archivo fuente completo.
pub fn load<R: BufRead>(reader: R, index: u32, name: &str) -> Result<Ast, Diagnostics> {
    let (start, stream) = source::consume(reader, index, name);

    let tokens = Lexer::new(start.clone(), stream)
        .try_exhaustive()
        .map_err(|errors| Diagnostics::from(errors).kind("lexical error"))?;

    parse(&tokens, start).map_err(|error| Diagnostics::from(error).kind("syntax error"))
}

/// Construye un árbol a partir de una secuencia de tokens.
pub fn parse(tokens: &[Located<Token>], start: Location) -> Result<Ast, Located<ParserError>> {
    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
        last_known: start,
    };

    parser.program().map(Ast::new).map_err(Failure::coerce)
}

#[derive(Clone)]
struct Parser<'a> {
    tokens: Peekable<slice::Iter<'a, Located<Token>>>,
    last_known: Location,
}

enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn weak(self) -> Self {
        Failure::Weak(self.coerce())
    }

    fn strict(self) -> Self {
        Failure::Strict(self.coerce())
    }

    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

/// Operadores de un nivel de precedencia.
type Level = &'static [(Token, Tag)];

const COMPARISON: Level = &[
    (Token::Equal, Tag::Eq),
    (Token::NotEqual, Tag::Ne),
    (Token::Less, Tag::Lt),
    (Token::LessOrEqual, Tag::Le),
    (Token::Greater, Tag::Gt),
    (Token::GreaterOrEqual, Tag::Ge),
];

const ADDITIVE: Level = &[(Token::Plus, Tag::Add), (Token::Minus, Tag::Sub)];

const MULTIPLICATIVE: Level = &[
    (Token::Times, Tag::Mul),
    (Token::Slash, Tag::Div),
    (Token::Percent, Tag::Rem),
];

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parse<Node> {
        let mut root = Node::new(Tag::Root, self.last_known.clone(), "");
        while self.tokens.peek().is_some() {
            root = root.adopt(self.definition()?);
        }

        Ok(root)
    }

    fn definition(&mut self) -> Parse<Node> {
        if let Some(Token::Keyword(Keyword::Struct)) = self.peek() {
            return self.structure();
        }

        let declarator = self.declarator(Tag::DeclId)?;
        let location = declarator.location().clone();

        if !self.accept(Token::OpenParen) {
            return self.variable(declarator);
        }

        let params = Node::new(Tag::Params, self.last_known.clone(), "(");
        let params = params.adopt_all(self.comma_separated(|s| s.declarator(Tag::DeclId), true)?);
        self.expect(Token::CloseParen)?;

        if self.accept(Token::Semicolon) {
            let prototype = Node::new(Tag::Prototype, location, "");
            return Ok(prototype.adopt(declarator).adopt(params));
        }

        let body = self.block()?;
        Ok(Node::new(Tag::Function, location, "")
            .adopt(declarator)
            .adopt(params)
            .adopt(body))
    }

    fn structure(&mut self) -> Parse<Node> {
        self.keyword(Keyword::Struct)?;
        let location = self.last_known.clone();
        let tag = self.type_id()?;

        self.expect(Token::OpenCurly)?;
        let mut fields = Node::new(Tag::Block, self.last_known.clone(), "{");

        while !self.accept(Token::CloseCurly) {
            fields = fields.adopt(self.declarator(Tag::Field).map_err(Failure::strict)?);
            self.expect(Token::Semicolon)?;
        }

        self.accept(Token::Semicolon);
        Ok(Node::new(Tag::Struct, location, "struct").adopt(tag).adopt(fields))
    }

    /// Tipo seguido del nombre que declara.
    fn declarator(&mut self, name: Tag) -> Parse<Node> {
        let declarator = self.typ()?;
        let (location, id) = self.id()?;

        Ok(declarator.adopt(Node::new(name, location, id)))
    }

    fn typ(&mut self) -> Parse<Node> {
        let (location, token) = self.next()?.split();
        let node = match token {
            Token::Keyword(Keyword::Void) => Node::new(Tag::Void, location, "void"),
            Token::Keyword(Keyword::Int) => Node::new(Tag::Int, location, "int"),
            Token::Keyword(Keyword::String) => Node::new(Tag::String, location, "string"),

            Token::Keyword(Keyword::Ptr) => {
                self.expect(Token::Less)?;
                self.keyword(Keyword::Struct)?;
                let tag = self.type_id()?;
                self.expect(Token::Greater)?;

                Node::new(Tag::Ptr, location, "ptr").adopt(tag)
            }

            Token::Keyword(Keyword::Array) => {
                self.expect(Token::Less)?;
                let element = self.typ().map_err(Failure::strict)?;
                if matches!(element.tag(), Tag::Void | Tag::Array) {
                    return self.fail(ParserError::ExpectedElementType);
                }

                self.expect(Token::Greater)?;
                Node::new(Tag::Array, location, "array").adopt(element)
            }

            _ => return self.fail(ParserError::ExpectedType).map_err(Failure::weak),
        };

        Ok(node)
    }

    fn type_id(&mut self) -> Parse<Node> {
        let (location, id) = self.id()?;
        Ok(Node::new(Tag::TypeId, location, id))
    }

    /// Resto de una declaración de variable, a partir del declarador.
    fn variable(&mut self, declarator: Node) -> Parse<Node> {
        let mut decl = Node::new(Tag::VarDecl, declarator.location().clone(), "");
        decl = decl.adopt(declarator);

        if self.accept(Token::Assign) {
            decl = decl.adopt(self.expr().map_err(Failure::strict)?);
        }

        self.expect(Token::Semicolon)?;
        Ok(decl)
    }

    fn block(&mut self) -> Parse<Node> {
        self.expect(Token::OpenCurly)?;

        let mut block = Node::new(Tag::Block, self.last_known.clone(), "{");
        while !self.accept(Token::CloseCurly) {
            if let Some(statement) = self.statement()? {
                block = block.adopt(statement);
            }
        }

        Ok(block)
    }

    /// Una sentencia. Las sentencias vacías no producen nodos.
    fn statement(&mut self) -> Parse<Option<Node>> {
        let statement = match self.peek() {
            Some(Token::Semicolon) => {
                self.next()?;
                return Ok(None);
            }

            Some(Token::OpenCurly) => self.block()?,
            Some(Token::Keyword(Keyword::If)) => self.if_statement()?,
            Some(Token::Keyword(Keyword::While)) => self.while_statement()?,
            Some(Token::Keyword(Keyword::Return)) => self.return_statement()?,

            Some(Token::Keyword(
                Keyword::Void | Keyword::Int | Keyword::String | Keyword::Ptr | Keyword::Array,
            )) => {
                let declarator = self.declarator(Tag::DeclId)?;
                self.variable(declarator)?
            }

            _ => {
                let expr = self.expr().map_err(Failure::strict)?;
                self.expect(Token::Semicolon)?;
                expr
            }
        };

        Ok(Some(statement))
    }

    /// Cuerpo de un `if`, `else` o `while`.
    fn body(&mut self) -> Parse<Node> {
        let location = self.last_known.clone();
        let body = self.statement()?;

        Ok(body.unwrap_or_else(|| Node::new(Tag::Block, location, "{")))
    }

    fn if_statement(&mut self) -> Parse<Node> {
        self.keyword(Keyword::If)?;
        let location = self.last_known.clone();

        let condition = self.condition()?;
        let mut node = Node::new(Tag::If, location, "if")
            .adopt(condition)
            .adopt(self.body()?);

        if self.accept(Token::Keyword(Keyword::Else)) {
            node = node.adopt(self.body()?);
        }

        Ok(node)
    }

    fn while_statement(&mut self) -> Parse<Node> {
        self.keyword(Keyword::While)?;
        let location = self.last_known.clone();

        let condition = self.condition()?;
        Ok(Node::new(Tag::While, location, "while")
            .adopt(condition)
            .adopt(self.body()?))
    }

    fn condition(&mut self) -> Parse<Node> {
        self.expect(Token::OpenParen)?;
        let condition = self.expr().map_err(Failure::strict)?;
        self.expect(Token::CloseParen)?;

        Ok(condition)
    }

    fn return_statement(&mut self) -> Parse<Node> {
        self.keyword(Keyword::Return)?;
        let node = Node::new(Tag::Return, self.last_known.clone(), "return");

        if self.accept(Token::Semicolon) {
            return Ok(node);
        }

        let value = self.expr().map_err(Failure::strict)?;
        self.expect(Token::Semicolon)?;

        Ok(node.adopt(value))
    }

    /// Expresión completa. La asignación asocia a la derecha.
    fn expr(&mut self) -> Parse<Node> {
        let target = self.binary(COMPARISON, |s| {
            s.binary(ADDITIVE, |s| s.binary(MULTIPLICATIVE, Parser::unary))
        })?;

        if !self.accept(Token::Assign) {
            return Ok(target);
        }

        let location = self.last_known.clone();
        let value = self.expr().map_err(Failure::strict)?;

        Ok(Node::new(Tag::Assign, location, "=").adopt(target).adopt(value))
    }

    /// Nivel de operadores binarios que asocian a la izquierda.
    fn binary<F>(&mut self, level: Level, operand: F) -> Parse<Node>
    where
        F: Fn(&mut Self) -> Parse<Node>,
    {
        let mut left = operand(self)?;

        loop {
            let tag = match self
                .peek()
                .and_then(|token| level.iter().find(|(operator, _)| operator == token))
            {
                Some(&(_, tag)) => tag,
                None => break Ok(left),
            };

            let location = self.next()?.location().clone();
            let right = operand(self).map_err(Failure::strict)?;

            left = Node::new(tag, location, tag.to_string())
                .adopt(left)
                .adopt(right);
        }
    }

    fn unary(&mut self) -> Parse<Node> {
        let tag = match self.peek() {
            Some(Token::Plus) => Tag::Pos,
            Some(Token::Minus) => Tag::Neg,
            Some(Token::Not) => Tag::Not,
            _ => return self.postfix(),
        };

        let location = self.next()?.location().clone();
        let operand = self.unary().map_err(Failure::strict)?;

        Ok(Node::new(tag, location, tag.to_string()).adopt(operand))
    }

    fn postfix(&mut self) -> Parse<Node> {
        let mut node = self.primary()?;

        loop {
            if self.accept(Token::OpenSquare) {
                let location = self.last_known.clone();
                let index = self.expr().map_err(Failure::strict)?;
                self.expect(Token::CloseSquare)?;

                node = Node::new(Tag::Index, location, "[").adopt(node).adopt(index);
            } else if self.accept(Token::Arrow) {
                node = self.arrow(node)?;
            } else {
                break Ok(node);
            }
        }
    }

    fn arrow(&mut self, base: Node) -> Parse<Node> {
        let location = self.last_known.clone();
        let (field_location, field) = self.id()?;

        Ok(Node::new(Tag::Arrow, location, "->")
            .adopt(base)
            .adopt(Node::new(Tag::Field, field_location, field)))
    }

    fn primary(&mut self) -> Parse<Node> {
        let (location, token) = self.next()?.split();
        let node = match token {
            Token::Id(id) => {
                let ident = Node::new(Tag::Ident, location, id.as_ref());
                if !self.accept(Token::OpenParen) {
                    return Ok(ident);
                }

                let call = Node::new(Tag::Call, self.last_known.clone(), "(").adopt(ident);
                let arguments = self.comma_separated(Parser::argument, true)?;
                self.expect(Token::CloseParen)?;

                call.adopt_all(arguments)
            }

            Token::Keyword(Keyword::Alloc) => return self.allocation(location),

            Token::OpenParen => {
                let inner = self.expr().map_err(Failure::strict)?;
                self.expect(Token::CloseParen)?;
                inner
            }

            token => match literal(token, location) {
                Some(literal) => literal,
                None => return self.fail(ParserError::ExpectedExpr).map_err(Failure::weak),
            },
        };

        Ok(node)
    }

    /// Argumento atómico de una llamada.
    fn argument(&mut self) -> Parse<Node> {
        let (location, token) = self.next()?.split();
        let mut node = match token {
            Token::Id(id) => Node::new(Tag::Ident, location, id.as_ref()),
            Token::CloseParen => return self.fail(ParserError::ExpectedArgument).map_err(Failure::weak),
            token => match literal(token, location) {
                Some(literal) => return Ok(literal),
                None => return self.fail(ParserError::ExpectedArgument),
            },
        };

        while self.accept(Token::Arrow) {
            node = self.arrow(node)?;
        }

        Ok(node)
    }

    fn allocation(&mut self, location: Location) -> Parse<Node> {
        self.expect(Token::Less)?;

        let (type_location, token) = self.next()?.split();
        let of = match token {
            Token::Keyword(Keyword::Struct) => self.type_id()?,
            Token::Keyword(Keyword::String) => Node::new(Tag::String, type_location, "string"),
            Token::Keyword(Keyword::Array) => {
                self.expect(Token::Less)?;
                let element = self.typ().map_err(Failure::strict)?;
                if matches!(element.tag(), Tag::Void | Tag::Array) {
                    return self.fail(ParserError::ExpectedElementType);
                }

                self.expect(Token::Greater)?;
                Node::new(Tag::Array, type_location, "array").adopt(element)
            }

            _ => return self.fail(ParserError::ExpectedAllocation),
        };

        self.expect(Token::Greater)?;
        self.expect(Token::OpenParen)?;

        let mut node = Node::new(Tag::Alloc, location, "alloc").adopt(of);
        if !self.accept(Token::CloseParen) {
            node = node.adopt(self.expr().map_err(Failure::strict)?);
            self.expect(Token::CloseParen)?;
        }

        Ok(node)
    }

    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let mut fork = self.clone();

        let result = rule(&mut fork);
        if result.is_ok() {
            *self = fork;
        }

        result
    }

    fn comma_separated<T, F>(&mut self, mut rule: F, allow_empty: bool) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        let mut items = match self.attempt(|s| rule(s)) {
            Err(Failure::Weak(_)) if allow_empty => return Ok(Vec::new()),
            item => vec![item.map_err(Failure::strict)?],
        };

        loop {
            match self.attempt(|s| s.expect(Token::Comma).map_err(Failure::weak)) {
                Err(Failure::Weak(_)) => break Ok(items),
                result => {
                    result?;
                    items.push(rule(self).map_err(Failure::strict)?);
                }
            }
        }
    }

    /// Consume un token si es el esperado.
    fn accept(&mut self, token: Token) -> bool {
        self.attempt(|s| s.expect(token).map_err(Failure::weak))
            .is_ok()
    }

    fn peek(&mut self) -> Option<&'a Token> {
        self.tokens.peek().copied().map(Located::val)
    }

    fn id(&mut self) -> Parse<(Location, String)> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok((location, id.to_string())),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error, self.last_known.clone())))
    }
}

fn literal(token: Token, location: Location) -> Option<Node> {
    let node = match token {
        Token::IntLiteral(text) => Node::new(Tag::IntCon, location, text),
        Token::CharLiteral(text) => Node::new(Tag::CharCon, location, text),
        Token::StringLiteral(text) => Node::new(Tag::StringCon, location, text),
        Token::Keyword(Keyword::Nullptr) => Node::new(Tag::NullPtr, location, "nullptr"),
        _ => return None,
    };

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(text: &str) -> Ast {
        match load(text.as_bytes(), 0, "test.oc") {
            Ok(ast) => ast,
            Err(diagnostics) => panic!("{}", diagnostics),
        }
    }

    /// Forma del árbol en notación prefija.
    fn shape(node: &Node) -> String {
        let children: Vec<_> = node.children().iter().map(shape).collect();
        match children.is_empty() {
            true => node.tag().to_string(),
            false => format!("({} {})", node.tag(), children.join(" ")),
        }
    }

    #[test]
    fn definitions_follow_the_tree_contract() {
        let ast = tree(
            "struct node { int value; ptr<struct node> next; };\n\
             array<string> names;\n\
             int f(int x, string s);\n\
             int f(int x, string s) { return x; }",
        );

        let shapes: Vec<_> = ast.root().children().iter().map(shape).collect();
        assert_eq!(
            shapes,
            vec![
                "(struct typeid (block (int field) (ptr typeid field)))",
                "(vardecl (array string declid))",
                "(prototype (int declid) (params (int declid) (string declid)))",
                "(function (int declid) (params (int declid) (string declid)) (block (return ident)))",
            ]
        );
    }

    #[test]
    fn precedence_and_associativity() {
        let ast = tree("void f() { a = b = c + d * -e == f; }");
        let body = ast.root().child(0).unwrap().child(2).unwrap();

        assert_eq!(
            shape(body.child(0).unwrap()),
            "(= ident (= ident (== (+ ident (* ident (- ident))) ident)))"
        );
    }

    #[test]
    fn statements_and_postfix_operators() {
        let ast = tree(
            "void f() {\n\
               if (!p) q->next->value = a[i]; else { g(p->next, 1, \"s\"); }\n\
               while (x < 10) ;\n\
               p = alloc<struct node>(); s = alloc<array<int>>(n);\n\
             }",
        );

        let body = ast.root().child(0).unwrap().child(2).unwrap();
        let shapes: Vec<_> = body.children().iter().map(shape).collect();

        assert_eq!(
            shapes,
            vec![
                "(if (! ident) (= (-> (-> ident field) field) (index ident ident)) (block (call ident (-> ident field) intcon stringcon)))",
                "(while (< ident intcon) block)",
                "(= ident (alloc typeid))",
                "(= ident (alloc (array int) ident))",
            ]
        );
    }

    #[test]
    fn call_arguments_must_be_atomic() {
        let error = load("void f() { g(a + b); }".as_bytes(), 0, "x").err().unwrap();
        assert!(error.to_string().contains("syntax error"));
    }
}
