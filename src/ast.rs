//! Árbol sintáctico del programa.
//!
//! El árbol es producido por [`crate::parse`] o por cualquier otro
//! productor externo que respete la forma de cada categoría sintáctica.
//! Una vez que un [`Node`] raíz se congela en un [`Ast`], cada nodo
//! recibe un [`NodeId`] estable y el árbol ya no se modifica. Las fases
//! posteriores guardan sus resultados en tablas laterales indexadas por
//! identidad de nodo.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;

use crate::source::{Located, Location};

/// Identidad de un nodo dentro de un [`Ast`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Categoría sintáctica de un nodo.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Root,
    Function,
    Prototype,
    Struct,
    Params,
    Block,
    VarDecl,

    Void,
    Int,
    String,
    Ptr,
    Array,
    TypeId,
    DeclId,
    Field,

    If,
    While,
    Return,

    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Pos,
    Neg,
    Not,
    Call,
    Index,
    Arrow,
    Alloc,

    Ident,
    IntCon,
    CharCon,
    StringCon,
    NullPtr,
}

impl Tag {
    /// Operador textual para nodos de expresión, tal como aparece en IR.
    pub fn operator(self) -> Option<&'static str> {
        use Tag::*;

        let operator = match self {
            Add | Pos => "+",
            Sub | Neg => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Not => "not",
            _ => return None,
        };

        Some(operator)
    }

    /// Determina si el nodo es un literal constante.
    pub fn is_literal(self) -> bool {
        matches!(self, Tag::IntCon | Tag::CharCon | Tag::StringCon | Tag::NullPtr)
    }
}

impl Display for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Tag::*;

        let name = match self {
            Root => "root",
            Function => "function",
            Prototype => "prototype",
            Struct => "struct",
            Params => "params",
            Block => "block",
            VarDecl => "vardecl",
            Void => "void",
            Int => "int",
            String => "string",
            Ptr => "ptr",
            Array => "array",
            TypeId => "typeid",
            DeclId => "declid",
            Field => "field",
            If => "if",
            While => "while",
            Return => "return",
            Assign => "=",
            Call => "call",
            Index => "index",
            Arrow => "->",
            Alloc => "alloc",
            Ident => "ident",
            IntCon => "intcon",
            CharCon => "charcon",
            StringCon => "stringcon",
            NullPtr => "nullptr",
            Not => "!",
            Add | Sub | Mul | Div | Rem | Eq | Ne | Lt | Le | Gt | Ge | Pos | Neg => {
                return fmt.write_str(self.operator().unwrap_or("?"))
            }
        };

        fmt.write_str(name)
    }
}

/// Violación del contrato de forma del árbol.
///
/// Estos errores no son culpa del usuario, sino de un productor de
/// árboles que no respeta la forma esperada de cada categoría.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ShapeError {
    #[error("Internal error: unexpected `{0}` node")]
    Unexpected(Tag),

    #[error("Internal error: `{0}` node is missing child #{1}")]
    MissingChild(Tag, usize),

    #[error("Internal error: `{0}` node has {1} children, expected {2}")]
    Arity(Tag, usize, usize),
}

pub type Shape<T> = Result<T, Located<ShapeError>>;

/// Un nodo del árbol, dueño exclusivo de sus hijos.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    tag: Tag,
    location: Location,
    lexeme: Rc<str>,
    children: Vec<Node>,
}

impl Node {
    /// Construye una hoja.
    pub fn new<S: Into<Rc<str>>>(tag: Tag, location: Location, lexeme: S) -> Self {
        Node {
            id: NodeId::default(),
            tag,
            location,
            lexeme: lexeme.into(),
            children: Vec::new(),
        }
    }

    /// Agrega un hijo al final.
    pub fn adopt(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Agrega varios hijos en orden.
    pub fn adopt_all<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        self.children.extend(children);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Obtiene un hijo que el contrato de forma garantiza.
    pub fn child(&self, index: usize) -> Shape<&Node> {
        self.children
            .get(index)
            .ok_or_else(|| self.fail(ShapeError::MissingChild(self.tag, index)))
    }

    /// Obtiene un hijo opcional.
    pub fn optional(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    /// Descompone un nodo binario.
    pub fn pair(&self) -> Shape<(&Node, &Node)> {
        match self.children.as_slice() {
            [left, right] => Ok((left, right)),
            children => Err(self.fail(ShapeError::Arity(self.tag, children.len(), 2))),
        }
    }

    /// Nodo del nombre declarado por un declarador.
    ///
    /// En todo declarador el nombre es el último hijo.
    pub fn declared_name(&self) -> Shape<&Node> {
        match self.children.last() {
            Some(name) if matches!(name.tag, Tag::DeclId | Tag::Field) => Ok(name),
            Some(other) => Err(other.unexpected()),
            None => Err(self.fail(ShapeError::MissingChild(self.tag, 0))),
        }
    }

    /// Error fatal por un nodo que no corresponde a su posición.
    pub fn unexpected(&self) -> Located<ShapeError> {
        self.fail(ShapeError::Unexpected(self.tag))
    }

    fn fail(&self, error: ShapeError) -> Located<ShapeError> {
        Located::at(error, self.location.clone())
    }

    fn number(&mut self, next: &mut u32) {
        self.id = NodeId(*next);
        *next += 1;

        for child in &mut self.children {
            child.number(next);
        }
    }
}

/// Árbol congelado, con identidades asignadas en preorden.
#[derive(Debug)]
pub struct Ast {
    root: Node,
    len: usize,
}

impl Ast {
    pub fn new(mut root: Node) -> Self {
        let mut next = 0;
        root.number(&mut next);

        Ast {
            root,
            len: next as usize,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Cantidad total de nodos.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn leaf(tag: Tag, lexeme: &str) -> Node {
        let source = Source::new(0, "test");
        Node::new(tag, Location::point(&source, 1, 1), lexeme)
    }

    #[test]
    fn freezing_numbers_nodes_in_preorder() {
        let tree = leaf(Tag::Root, "").adopt(
            leaf(Tag::Assign, "=")
                .adopt(leaf(Tag::Ident, "a"))
                .adopt(leaf(Tag::IntCon, "1")),
        );

        let ast = Ast::new(tree);
        assert_eq!(ast.len(), 4);

        let assign = ast.root().child(0).unwrap();
        let (left, right) = assign.pair().unwrap();
        assert!(assign.id() < left.id() && left.id() < right.id());
    }

    #[test]
    fn missing_children_are_shape_errors() {
        let ret = leaf(Tag::Assign, "=").adopt(leaf(Tag::Ident, "a"));
        let error = ret.pair().unwrap_err();
        assert!(matches!(error.val(), ShapeError::Arity(Tag::Assign, 1, 2)));

        let decl = leaf(Tag::Int, "int");
        assert!(matches!(
            decl.declared_name().unwrap_err().val(),
            ShapeError::MissingChild(Tag::Int, 0)
        ));
    }
}
