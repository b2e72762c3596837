//! Análisis semántico.
//!
//! Un recorrido en postorden clasifica cada expresión con un conjunto de
//! [`Attributes`], resuelve nombres contra los alcances y reporta errores
//! de tipo. Los errores de usuario se recuperan localmente: se registran,
//! el nodo afectado queda sin atributos y el recorrido continúa. Solo una
//! violación de forma del árbol aborta el análisis.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    io::{self, Write},
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::{Ast, Node, NodeId, ShapeError, Tag},
    attr::Attributes,
    source::Located,
    symbol::{Role, Scopes, Symbol, SymbolId, SymbolTable, Symbols, Target},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SemanticError {
    #[error("Duplicate declaration of `{0}`")]
    DuplicateDeclaration(String),

    #[error("Variable `{0}` is undefined")]
    UndefinedVariable(String),

    #[error("Type `struct {0}` is undefined")]
    UndefinedType(String),

    #[error("Field `{0}` is undefined for this operand")]
    UndefinedField(String),

    #[error("`{0}` is not a function")]
    NotCallable(String),

    #[error("Incompatible types in assignment: expected `{0}`, found `{1}`")]
    IncompatibleAssignment(Attributes, Attributes),

    #[error("Incompatible operands for `{0}`: `{1}` and `{2}`")]
    IncompatibleBinop(Tag, Attributes, Attributes),

    #[error("Incompatible operand for `{0}`: `{1}`")]
    IncompatibleUnop(Tag, Attributes),

    #[error("Incompatible comparison with `{0}`: `{1}` and `{2}`")]
    IncompatibleCompare(Tag, Attributes, Attributes),

    #[error("Incompatible index: `{1}` applied to `{0}`")]
    IncompatibleIndex(Attributes, Attributes),

    #[error("Incompatible arguments in call to `{0}`")]
    IncompatibleArgument(String),

    #[error("Incompatible return: expected `{0}`, found `{1}`")]
    IncompatibleReturn(Attributes, Attributes),

    #[error("Definition of `{0}` does not match its prototype")]
    IncompatiblePrototype(String),

    #[error(transparent)]
    InternalShape(#[from] ShapeError),
}

impl SemanticError {
    /// Determina si el error debe abortar el análisis.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SemanticError::InternalShape(_))
    }
}

impl From<Located<ShapeError>> for Located<SemanticError> {
    fn from(error: Located<ShapeError>) -> Self {
        error.map(SemanticError::InternalShape)
    }
}

/// Clasificación de etiquetas según la regla semántica que aplica.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Category {
    Assignment,
    BinaryOp,
    Call,
    Comparison,
    FieldAccess,
    Identifier,
    Index,
    IntLiteral,
    NullLiteral,
    Return,
    StringLiteral,
    UnaryOp,
    VariableDeclaration,
    Allocation,
    Other,
}

impl From<Tag> for Category {
    fn from(tag: Tag) -> Self {
        use Category::*;

        match tag {
            Tag::Assign => Assignment,
            Tag::Add | Tag::Sub | Tag::Mul | Tag::Div | Tag::Rem => BinaryOp,
            Tag::Call => Call,
            Tag::Eq | Tag::Ne | Tag::Lt | Tag::Le | Tag::Gt | Tag::Ge => Comparison,
            Tag::Arrow => FieldAccess,
            Tag::Ident => Identifier,
            Tag::Index => Index,
            Tag::IntCon | Tag::CharCon => IntLiteral,
            Tag::NullPtr => NullLiteral,
            Tag::Return => Return,
            Tag::StringCon => StringLiteral,
            Tag::Pos | Tag::Neg | Tag::Not => UnaryOp,
            Tag::VarDecl => VariableDeclaration,
            Tag::Alloc => Allocation,

            Tag::Root
            | Tag::Function
            | Tag::Prototype
            | Tag::Struct
            | Tag::Params
            | Tag::Block
            | Tag::Void
            | Tag::Int
            | Tag::String
            | Tag::Ptr
            | Tag::Array
            | Tag::TypeId
            | Tag::DeclId
            | Tag::Field
            | Tag::If
            | Tag::While => Other,
        }
    }
}

/// Tablas laterales indexadas por identidad de nodo.
#[derive(Debug, Default)]
pub struct Annotations {
    attributes: HashMap<NodeId, Attributes>,
    symbols: HashMap<NodeId, SymbolId>,
    blocks: HashMap<NodeId, usize>,
}

impl Annotations {
    /// Atributos de un nodo. Un nodo sin entrada no tiene atributos.
    pub fn attributes(&self, node: &Node) -> Attributes {
        self.attributes.get(&node.id()).copied().unwrap_or_default()
    }

    /// Símbolo resuelto para un nodo.
    pub fn symbol(&self, node: &Node) -> Option<SymbolId> {
        self.symbols.get(&node.id()).copied()
    }

    /// Número de bloque en el que se encontró un nodo.
    pub fn block(&self, node: &Node) -> Option<usize> {
        self.blocks.get(&node.id()).copied()
    }

    pub(crate) fn set_attributes(&mut self, node: &Node, attributes: Attributes) {
        self.attributes.insert(node.id(), attributes);
    }

    pub(crate) fn resolve(&mut self, node: &Node, symbol: SymbolId, attributes: Attributes) {
        self.symbols.insert(node.id(), symbol);
        self.attributes.insert(node.id(), attributes);
    }

    pub(crate) fn stamp_block(&mut self, node: &Node, block: usize) {
        self.blocks.insert(node.id(), block);
    }
}

/// Una entrada del reporte de símbolos: un símbolo de nivel superior
/// seguido de los símbolos de su alcance anidado.
#[derive(Debug, Clone)]
pub struct Entry {
    symbol: SymbolId,
    nested: Vec<SymbolId>,
}

impl Entry {
    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    pub fn nested(&self) -> &[SymbolId] {
        &self.nested
    }
}

/// Resultado de analizar una unidad de compilación.
#[derive(Debug)]
pub struct Analysis {
    symbols: Symbols,
    structs: SymbolTable,
    globals: SymbolTable,
    notes: Annotations,
    report: Vec<Entry>,
    errors: Vec<Located<SemanticError>>,
}

impl Analysis {
    pub fn attributes(&self, node: &Node) -> Attributes {
        self.notes.attributes(node)
    }

    pub fn symbol_id(&self, node: &Node) -> Option<SymbolId> {
        self.notes.symbol(node)
    }

    pub fn symbol(&self, node: &Node) -> Option<&Symbol> {
        self.notes.symbol(node).map(|id| &self.symbols[id])
    }

    pub fn block(&self, node: &Node) -> Option<usize> {
        self.notes.block(node)
    }

    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    pub fn globals(&self) -> &SymbolTable {
        &self.globals
    }

    pub fn structs(&self) -> &SymbolTable {
        &self.structs
    }

    pub fn entries(&self) -> &[Entry] {
        &self.report
    }

    pub fn errors(&self) -> &[Located<SemanticError>] {
        &self.errors
    }

    /// Determina si no se encontraron errores.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<Located<SemanticError>> {
        std::mem::take(&mut self.errors)
    }

    /// Vista imprimible del reporte de tablas de símbolos.
    pub fn report(&self) -> Report<'_> {
        Report(self)
    }

    pub fn write_report<W: Write>(&self, output: &mut W) -> io::Result<()> {
        write!(output, "{}", self.report())
    }
}

/// Reporte de símbolos en orden de recorrido.
pub struct Report<'a>(&'a Analysis);

impl Report<'_> {
    fn line(&self, fmt: &mut fmt::Formatter<'_>, id: SymbolId) -> fmt::Result {
        let symbols = &self.0.symbols;
        let symbol = &symbols[id];
        let start = symbol.location().start();

        write!(
            fmt,
            "{} ({}.{}.{}) {{{}}}",
            symbol.name(),
            symbol.location().file(),
            start.line(),
            start.column(),
            symbol.block()
        )?;

        for name in symbol.attributes().names() {
            write!(fmt, " {}", name)?;

            if name == "struct" {
                if let Some(tag) = symbols.type_name(id) {
                    write!(fmt, " \"{}\"", tag)?;
                }
            }
        }

        if let Some(sequence) = symbol.sequence() {
            write!(fmt, " {}", sequence)?;
        }

        writeln!(fmt)
    }
}

impl Display for Report<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0.report {
            self.line(fmt, entry.symbol)?;
            for nested in &entry.nested {
                fmt.write_str("   ")?;
                self.line(fmt, *nested)?;
            }
        }

        Ok(())
    }
}

/// Analiza una unidad de compilación.
///
/// Los errores de usuario quedan registrados en el [`Analysis`]
/// resultante. Solo una violación de forma se retorna como `Err`.
pub fn analyze(ast: &Ast) -> Semantic<Analysis> {
    let mut analyzer = Analyzer::default();
    analyzer.top_level(ast.root())?;

    debug!(
        "analysis finished: {} entries, {} errors",
        analyzer.report.len(),
        analyzer.errors.len()
    );

    let Analyzer {
        scopes,
        notes,
        report,
        errors,
        ..
    } = analyzer;

    let (symbols, structs, globals) = scopes.into_parts();
    Ok(Analysis {
        symbols,
        structs,
        globals,
        notes,
        report,
        errors,
    })
}

#[derive(Default)]
struct Analyzer {
    scopes: Scopes,
    notes: Annotations,
    report: Vec<Entry>,
    errors: Vec<Located<SemanticError>>,
    locals: usize,
}

impl Analyzer {
    fn top_level(&mut self, node: &Node) -> Semantic<()> {
        self.notes.stamp_block(node, 0);

        match node.tag() {
            Tag::Root => node
                .children()
                .iter()
                .try_for_each(|child| self.top_level(child)),

            Tag::Function => self.function(node),
            Tag::Prototype => self.prototype(node),
            Tag::Struct => self.structure(node),

            Tag::VarDecl => {
                let declared = self.declaration(node, Target::Global, Role::Variable, None)?;
                if let Some(symbol) = declared {
                    self.report.push(Entry {
                        symbol,
                        nested: Vec::new(),
                    });
                }

                Ok(())
            }

            _ => Err(node.unexpected().into()),
        }
    }

    fn function(&mut self, node: &Node) -> Semantic<()> {
        let declarator = node.child(0)?;
        let body = expect(node.child(2)?, Tag::Block)?;
        let name = declarator.declared_name()?;

        self.scopes.enter();
        let parameters = self.parameters(node.child(1)?)?;

        let function = match self.scopes.globals().get(name.lexeme()) {
            None => {
                let declared = self.scopes.declare(
                    declarator,
                    Target::Global,
                    Role::Function,
                    None,
                    &mut self.notes,
                );

                self.recover(declared)?
            }

            Some(prior) => self.redefinition(node, name, prior, &parameters),
        };

        let function = match function {
            Some(function) => function,
            None => {
                debug!("discarding definition of `{}`", name.lexeme());
                self.scopes.leave();
                return Ok(());
            }
        };

        self.scopes.set_parameters(function, parameters);
        self.scopes.set_defined(function);
        self.scopes.set_function(Some(function));
        self.locals = 0;

        self.visit(body)?;

        let locals = self.scopes.leave();
        self.push_entry(function, &locals);

        Ok(())
    }

    /// Resuelve una definición contra un nombre global ya existente.
    fn redefinition(
        &mut self,
        node: &Node,
        name: &Node,
        prior: SymbolId,
        parameters: &[SymbolId],
    ) -> Option<SymbolId> {
        let symbols = self.scopes.symbols();
        let symbol = &symbols[prior];

        let error = if !symbol.attributes().contains(Attributes::FUNCTION) || symbol.is_defined() {
            SemanticError::DuplicateDeclaration(name.lexeme().to_owned())
        } else if !symbols.compatible_parameters(symbol.parameters(), parameters) {
            SemanticError::IncompatiblePrototype(name.lexeme().to_owned())
        } else {
            self.notes.resolve(name, prior, symbol.attributes());
            return Some(prior);
        };

        self.errors.push(Located::at(error, node.location().clone()));
        None
    }

    fn prototype(&mut self, node: &Node) -> Semantic<()> {
        let declarator = node.child(0)?;

        self.scopes.enter();
        let parameters = self.parameters(node.child(1)?)?;

        let declared = self.scopes.declare(
            declarator,
            Target::Global,
            Role::Function,
            None,
            &mut self.notes,
        );

        let function = self.recover(declared)?;
        let locals = self.scopes.leave();

        if let Some(function) = function {
            self.scopes.set_parameters(function, parameters);
            self.push_entry(function, &locals);
        }

        Ok(())
    }

    fn structure(&mut self, node: &Node) -> Semantic<()> {
        let tag = expect(node.child(0)?, Tag::TypeId)?;
        let fields = expect(node.child(1)?, Tag::Block)?;

        let declared = self.scopes.declare_struct(tag, &mut self.notes);
        let structure = match self.recover(declared)? {
            Some(structure) => structure,
            None => return Ok(()),
        };

        let block = self.scopes.enter();
        for (position, field) in fields.children().iter().enumerate() {
            self.notes.stamp_block(field, block);

            let declared = self.scopes.declare(
                field,
                Target::Fields(structure),
                Role::Field,
                Some(position),
                &mut self.notes,
            );

            self.recover(declared)?;
        }

        self.scopes.leave();

        let nested = self
            .scopes
            .symbols()
            .fields(structure)
            .map(|fields| self.scopes.symbols().sorted(fields))
            .unwrap_or_default();

        self.report.push(Entry {
            symbol: structure,
            nested,
        });

        Ok(())
    }

    fn parameters(&mut self, params: &Node) -> Semantic<Vec<SymbolId>> {
        let params = expect(params, Tag::Params)?;
        self.notes.stamp_block(params, self.scopes.block());

        let mut declared = Vec::with_capacity(params.children().len());
        for (position, param) in params.children().iter().enumerate() {
            self.notes.stamp_block(param, self.scopes.block());

            let result = self.scopes.declare(
                param,
                Target::Local,
                Role::Param,
                Some(position),
                &mut self.notes,
            );

            if let Some(id) = self.recover(result)? {
                declared.push(id);
            }
        }

        Ok(declared)
    }

    /// Declaración con inicializador opcional.
    ///
    /// El inicializador se analiza antes de declarar, de modo que
    /// `int a = a;` no puede referirse a sí mismo.
    fn declaration(
        &mut self,
        node: &Node,
        target: Target,
        role: Role,
        sequence: Option<usize>,
    ) -> Semantic<Option<SymbolId>> {
        let declarator = node.child(0)?;
        let initializer = node.optional(1);

        if node.children().len() > 2 {
            return Err(Located::at(
                ShapeError::Arity(node.tag(), node.children().len(), 2),
                node.location().clone(),
            )
            .into());
        }

        if let Some(initializer) = initializer {
            self.visit(initializer)?;
        }

        let declared = self
            .scopes
            .declare(declarator, target, role, sequence, &mut self.notes);

        let symbol = match self.recover(declared)? {
            Some(symbol) => symbol,
            None => return Ok(None),
        };

        if let Some(initializer) = initializer {
            let expected = self.scopes.symbols()[symbol].attributes();
            let found = self.notes.attributes(initializer);

            if !expected.compatible(found) {
                self.errors.push(Located::at(
                    SemanticError::IncompatibleAssignment(expected, found),
                    initializer.location().clone(),
                ));
            }
        }

        Ok(Some(symbol))
    }

    fn visit(&mut self, node: &Node) -> Semantic<()> {
        self.notes.stamp_block(node, self.scopes.block());

        match Category::from(node.tag()) {
            Category::VariableDeclaration => {
                let sequence = self.locals;
                self.locals += 1;

                self.declaration(node, Target::Local, Role::Local, Some(sequence))?;
                return Ok(());
            }

            Category::FieldAccess => self.visit(node.child(0)?)?,

            Category::Allocation => {
                if let Some(size) = node.optional(1) {
                    self.visit(size)?;
                }

                let result = self.allocation(node);
                self.recover(result)?;
                return Ok(());
            }

            _ => {
                for child in node.children() {
                    self.visit(child)?;
                }
            }
        }

        let result = self.check(node);
        self.recover(result)?;

        Ok(())
    }

    /// Aplica la regla de un nodo cuyos hijos ya fueron analizados.
    fn check(&mut self, node: &Node) -> Semantic<()> {
        let attributes = match Category::from(node.tag()) {
            Category::Identifier => {
                self.scopes.lookup_variable(node, &mut self.notes)?;
                return Ok(());
            }

            Category::IntLiteral => Attributes::INT | Attributes::CONST,
            Category::StringLiteral => Attributes::STRING | Attributes::CONST,
            Category::NullLiteral => Attributes::NULLPTR | Attributes::CONST,

            Category::BinaryOp => {
                let (left, right) = node.pair()?;
                let (left, right) = (self.notes.attributes(left), self.notes.attributes(right));

                if !left.contains(Attributes::INT) || !right.contains(Attributes::INT) {
                    return Err(self.fail(node, SemanticError::IncompatibleBinop(node.tag(), left, right)));
                }

                Attributes::INT | Attributes::VREG
            }

            Category::UnaryOp => {
                let operand = self.notes.attributes(node.child(0)?);
                if !operand.contains(Attributes::INT) {
                    return Err(self.fail(node, SemanticError::IncompatibleUnop(node.tag(), operand)));
                }

                Attributes::INT | Attributes::VREG
            }

            Category::Comparison => {
                let (left, right) = node.pair()?;
                let (left, right) = (self.notes.attributes(left), self.notes.attributes(right));

                if !left.compatible(right) {
                    return Err(self.fail(node, SemanticError::IncompatibleCompare(node.tag(), left, right)));
                }

                Attributes::INT | Attributes::VREG
            }

            Category::Assignment => {
                let (left, right) = node.pair()?;
                let (left, right) = (self.notes.attributes(left), self.notes.attributes(right));

                if !left.contains(Attributes::LVAL) || !left.compatible(right) {
                    return Err(self.fail(node, SemanticError::IncompatibleAssignment(left, right)));
                }

                left | Attributes::VREG
            }

            Category::FieldAccess => return self.field_access(node),

            Category::Index => {
                let (base, index) = node.pair()?;
                let (base, index) = (self.notes.attributes(base), self.notes.attributes(index));

                let element = if !index.contains(Attributes::INT) {
                    None
                } else if base.contains(Attributes::ARRAY) {
                    Some(base.element_type())
                } else if base.contains(Attributes::STRING) {
                    Some(Attributes::INT)
                } else {
                    None
                };

                match element {
                    Some(element) => element.kind() | Attributes::VADDR | Attributes::LVAL,
                    None => return Err(self.fail(node, SemanticError::IncompatibleIndex(base, index))),
                }
            }

            Category::Call => match self.call(node)? {
                Some(attributes) => attributes,
                None => return Ok(()),
            },

            Category::Return => return self.ret(node),

            Category::VariableDeclaration | Category::Allocation | Category::Other => return Ok(()),
        };

        self.notes.set_attributes(node, attributes);
        Ok(())
    }

    fn field_access(&mut self, node: &Node) -> Semantic<()> {
        let (base, field) = node.pair()?;
        let base_attributes = self.notes.attributes(base);

        let resolved = self
            .notes
            .symbol(base)
            .filter(|_| {
                base_attributes.contains(Attributes::STRUCT)
                    && !base_attributes.contains(Attributes::ARRAY)
            })
            .and_then(|base| self.scopes.symbols().field(base, field.lexeme()));

        let resolved = resolved.ok_or_else(|| {
            self.fail(field, SemanticError::UndefinedField(field.lexeme().to_owned()))
        })?;

        let kind = self.scopes.symbols()[resolved].attributes().kind();
        let attributes = kind | Attributes::VADDR | Attributes::LVAL;

        self.notes.stamp_block(field, self.scopes.block());
        self.notes.resolve(field, resolved, attributes);
        self.notes.resolve(node, resolved, attributes);

        Ok(())
    }

    /// Verifica una llamada. Retorna los atributos del resultado si la
    /// cantidad de argumentos coincide con la de parámetros.
    fn call(&mut self, node: &Node) -> Semantic<Option<Attributes>> {
        let callee = node.child(0)?;
        let arguments = &node.children()[1..];

        // Un nombre indefinido ya fue reportado al visitar el callee
        let function = match self.notes.symbol(callee) {
            Some(function) => function,
            None => return Ok(None),
        };

        let symbols = self.scopes.symbols();
        let symbol = &symbols[function];

        if !symbol.attributes().contains(Attributes::FUNCTION) {
            return Err(self.fail(callee, SemanticError::NotCallable(callee.lexeme().to_owned())));
        }

        let parameters = symbol.parameters();
        if parameters.len() != arguments.len() {
            return Err(self.fail(node, SemanticError::IncompatibleArgument(callee.lexeme().to_owned())));
        }

        for (argument, parameter) in arguments.iter().zip(parameters) {
            let found = self.notes.attributes(argument);
            if !symbols[*parameter].attributes().compatible(found) {
                trace!("argument `{}` does not match `{}`", found, symbols[*parameter].name());

                self.errors.push(Located::at(
                    SemanticError::IncompatibleArgument(callee.lexeme().to_owned()),
                    argument.location().clone(),
                ));
            }
        }

        Ok(Some(symbol.attributes().kind() | Attributes::VREG))
    }

    fn ret(&mut self, node: &Node) -> Semantic<()> {
        let function = match self.scopes.function() {
            Some(function) => function,
            None => return Err(node.unexpected().into()),
        };

        let expected = self.scopes.symbols()[function].attributes();
        let found = match node.optional(0) {
            Some(value) => self.notes.attributes(value),
            None => Attributes::VOID,
        };

        let valid = match node.optional(0) {
            Some(_) => expected.compatible(found),
            None => expected.contains(Attributes::VOID),
        };

        if !valid {
            return Err(self.fail(node, SemanticError::IncompatibleReturn(expected.kind(), found.kind())));
        }

        Ok(())
    }

    fn allocation(&mut self, node: &Node) -> Semantic<()> {
        let (kind, structure) = self.scopes.type_of(node.child(0)?, &mut self.notes)?;

        if let Some(size) = node.optional(1) {
            let found = self.notes.attributes(size);
            if !found.contains(Attributes::INT) {
                return Err(self.fail(size, SemanticError::IncompatibleIndex(kind, found)));
            }
        }

        let attributes = kind | Attributes::VREG;
        match structure {
            Some(tag) => self.notes.resolve(node, tag, attributes),
            None => self.notes.set_attributes(node, attributes),
        }

        Ok(())
    }

    /// Registra un error recuperable o propaga uno fatal.
    fn recover<T>(&mut self, result: Semantic<T>) -> Semantic<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.val().is_fatal() => Err(error),
            Err(error) => {
                debug!("{}: {}", error.location(), error.val());
                self.errors.push(error);
                Ok(None)
            }
        }
    }

    fn push_entry(&mut self, symbol: SymbolId, locals: &SymbolTable) {
        let nested = self.scopes.symbols().sorted(locals);
        self.report.push(Entry { symbol, nested });
    }

    fn fail(&self, node: &Node, error: SemanticError) -> Located<SemanticError> {
        Located::at(error, node.location().clone())
    }
}

fn expect(node: &Node, tag: Tag) -> Semantic<&Node> {
    if node.tag() == tag {
        Ok(node)
    } else {
        Err(node.unexpected().into())
    }
}
