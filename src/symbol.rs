//! Símbolos y tablas de símbolos.
//!
//! Todo nombre declarado (variable, parámetro, local, campo, función o
//! etiqueta de estructura) se representa por un [`Symbol`]. Los símbolos
//! viven en una arena ([`Symbols`]) y las tablas solo asocian nombres a
//! [`SymbolId`]. Una etiqueta de estructura es dueña de su tabla de
//! campos; las variables de tipo estructura acceden a esa tabla a través
//! de la etiqueta.

use std::{collections::HashMap, ops::Index, rc::Rc};

use log::trace;

use crate::{
    ast::{Node, Tag},
    attr::{self, Attributes},
    semantic::{Annotations, Semantic, SemanticError},
    source::{Located, Location},
};

/// Identidad de un símbolo dentro de su arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

/// Un nombre declarado.
#[derive(Debug, Clone)]
pub struct Symbol {
    name: Rc<str>,
    attributes: Attributes,
    sequence: Option<usize>,
    block: usize,
    location: Location,
    structure: Option<SymbolId>,
    fields: Option<SymbolTable>,
    parameters: Vec<SymbolId>,
    defined: bool,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    /// Posición dentro de una lista de parámetros, campos o locales.
    pub fn sequence(&self) -> Option<usize> {
        self.sequence
    }

    /// Número de bloque donde ocurre la declaración.
    pub fn block(&self) -> usize {
        self.block
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Etiqueta de estructura que da tipo a este símbolo, si existe.
    ///
    /// Para una etiqueta de estructura, esta es la misma etiqueta.
    pub fn structure(&self) -> Option<SymbolId> {
        self.structure
    }

    /// Parámetros de una función, en orden.
    pub fn parameters(&self) -> &[SymbolId] {
        &self.parameters
    }

    /// Determina si una función ya tiene cuerpo.
    pub fn is_defined(&self) -> bool {
        self.defined
    }
}

/// Asociación única de nombres a símbolos.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<Rc<str>, SymbolId>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.entries.get(name).copied()
    }

    /// Inserta un nombre nuevo. Si ya existe, se conserva la asociación
    /// original y esta se retorna como error.
    pub fn insert(&mut self, name: Rc<str>, id: SymbolId) -> Result<(), SymbolId> {
        match self.entries.get(&name) {
            Some(existing) => Err(*existing),
            None => {
                self.entries.insert(name, id);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.values().copied()
    }
}

/// Arena de símbolos de una unidad de compilación.
#[derive(Debug, Default)]
pub struct Symbols(Vec<Symbol>);

impl Symbols {
    fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        self.0.push(symbol);
        SymbolId(self.0.len() - 1)
    }

    fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.0[id.0]
    }

    /// Símbolos de una tabla, ordenados por (archivo, línea, columna).
    pub fn sorted(&self, table: &SymbolTable) -> Vec<SymbolId> {
        let mut ids: Vec<_> = table.ids().collect();
        ids.sort_by_key(|id| self[*id].location.key());
        ids
    }

    /// Tabla de campos visible desde un símbolo de tipo estructura.
    pub fn fields(&self, id: SymbolId) -> Option<&SymbolTable> {
        let structure = self[id].structure?;
        self[structure].fields.as_ref()
    }

    /// Busca un campo a través de la etiqueta de estructura del símbolo.
    pub fn field(&self, id: SymbolId, name: &str) -> Option<SymbolId> {
        self.fields(id).and_then(|fields| fields.get(name))
    }

    /// Nombre de la etiqueta de estructura que da tipo a un símbolo.
    pub fn type_name(&self, id: SymbolId) -> Option<&str> {
        self[id].structure.map(|structure| self[structure].name())
    }

    /// Compatibilidad de dos listas de parámetros.
    pub fn compatible_parameters(&self, first: &[SymbolId], second: &[SymbolId]) -> bool {
        attr::compatible_sequence(
            first.iter().map(|id| self[*id].attributes),
            second.iter().map(|id| self[*id].attributes),
        )
    }
}

impl Index<SymbolId> for Symbols {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        &self.0[id.0]
    }
}

/// Uso de un nombre declarado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Variable,
    Local,
    Param,
    Field,
    Function,
}

impl Role {
    fn attributes(self) -> Attributes {
        match self {
            Role::Variable => Attributes::VARIABLE | Attributes::LVAL,
            Role::Local => Attributes::VARIABLE | Attributes::LOCAL | Attributes::LVAL,
            Role::Param => Attributes::VARIABLE | Attributes::PARAM | Attributes::LVAL,
            Role::Field => Attributes::FIELD,
            Role::Function => Attributes::FUNCTION,
        }
    }
}

/// Tabla destino de una declaración.
#[derive(Copy, Clone, Debug)]
pub enum Target {
    Global,

    /// Tabla local actual, o la global si no hay alguna.
    Local,

    /// Tabla de campos de una etiqueta de estructura.
    Fields(SymbolId),
}

/// Estado de alcances de una unidad de compilación.
#[derive(Debug)]
pub struct Scopes {
    symbols: Symbols,
    structs: SymbolTable,
    globals: SymbolTable,
    local: Option<SymbolTable>,
    next_block: usize,
    block: usize,
    function: Option<SymbolId>,
}

impl Default for Scopes {
    fn default() -> Self {
        Scopes {
            symbols: Symbols::default(),
            structs: SymbolTable::default(),
            globals: SymbolTable::default(),
            local: None,
            next_block: 1,
            block: 0,
            function: None,
        }
    }
}

impl Scopes {
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    pub fn globals(&self) -> &SymbolTable {
        &self.globals
    }

    pub fn structs(&self) -> &SymbolTable {
        &self.structs
    }

    /// Bloque actual.
    pub fn block(&self) -> usize {
        self.block
    }

    /// Función cuyo cuerpo se analiza actualmente.
    pub fn function(&self) -> Option<SymbolId> {
        self.function
    }

    pub fn set_function(&mut self, function: Option<SymbolId>) {
        self.function = function;
    }

    /// Entra a un cuerpo de función o estructura.
    ///
    /// Se asigna un número de bloque nuevo que nunca se reutiliza y
    /// una tabla local vacía.
    pub fn enter(&mut self) -> usize {
        self.block = self.next_block;
        self.next_block += 1;
        self.local = Some(SymbolTable::default());

        trace!("entering block {}", self.block);
        self.block
    }

    /// Sale del cuerpo actual y restaura la tabla global.
    pub fn leave(&mut self) -> SymbolTable {
        trace!("leaving block {}", self.block);

        self.block = 0;
        self.function = None;
        self.local.take().unwrap_or_default()
    }

    /// Declara el nombre de un declarador en `target`.
    pub fn declare(
        &mut self,
        declarator: &Node,
        target: Target,
        role: Role,
        sequence: Option<usize>,
        notes: &mut Annotations,
    ) -> Semantic<SymbolId> {
        let name = declarator.declared_name()?;
        let (kind, structure) = self.type_of(declarator, notes)?;
        notes.set_attributes(declarator, kind);

        let attributes = kind | role.attributes();
        // Campos y globales pertenecen al alcance de archivo
        let block = match target {
            Target::Local if self.local.is_some() => self.block,
            _ => 0,
        };

        let id = self.symbols.alloc(Symbol {
            name: name.lexeme().into(),
            attributes,
            sequence,
            block,
            location: name.location().clone(),
            structure,
            fields: None,
            parameters: Vec::new(),
            defined: false,
        });

        trace!("declaring `{}` as {}", name.lexeme(), attributes);
        self.table_mut(target)
            .insert(name.lexeme().into(), id)
            .map_err(|_| {
                Located::at(
                    SemanticError::DuplicateDeclaration(name.lexeme().to_owned()),
                    name.location().clone(),
                )
            })?;

        notes.stamp_block(name, self.block);
        notes.resolve(name, id, attributes);

        Ok(id)
    }

    /// Registra una etiqueta de estructura nueva con tabla de campos vacía.
    pub fn declare_struct(&mut self, tag: &Node, notes: &mut Annotations) -> Semantic<SymbolId> {
        let attributes = Attributes::STRUCT | Attributes::TYPEID;
        let id = SymbolId(self.symbols.0.len());

        self.symbols.alloc(Symbol {
            name: tag.lexeme().into(),
            attributes,
            sequence: None,
            block: 0,
            location: tag.location().clone(),
            structure: Some(id),
            fields: Some(SymbolTable::default()),
            parameters: Vec::new(),
            defined: true,
        });

        self.structs
            .insert(tag.lexeme().into(), id)
            .map_err(|_| {
                Located::at(
                    SemanticError::DuplicateDeclaration(tag.lexeme().to_owned()),
                    tag.location().clone(),
                )
            })?;

        notes.resolve(tag, id, attributes);
        Ok(id)
    }

    /// Busca una variable o función en la tabla local y luego en la global.
    pub fn lookup_variable(&self, node: &Node, notes: &mut Annotations) -> Semantic<SymbolId> {
        let name = node.lexeme();
        let id = self
            .local
            .as_ref()
            .and_then(|local| local.get(name))
            .or_else(|| self.globals.get(name))
            .ok_or_else(|| {
                Located::at(
                    SemanticError::UndefinedVariable(name.to_owned()),
                    node.location().clone(),
                )
            })?;

        notes.resolve(node, id, self.symbols[id].attributes);
        Ok(id)
    }

    /// Busca una etiqueta de estructura.
    pub fn lookup_struct_tag(&self, node: &Node, notes: &mut Annotations) -> Semantic<SymbolId> {
        let id = self.structs.get(node.lexeme()).ok_or_else(|| {
            Located::at(
                SemanticError::UndefinedType(node.lexeme().to_owned()),
                node.location().clone(),
            )
        })?;

        notes.resolve(node, id, self.symbols[id].attributes);
        Ok(id)
    }

    /// Clase base de un tipo declarado y su etiqueta de estructura, si aplica.
    pub fn type_of(
        &self,
        node: &Node,
        notes: &mut Annotations,
    ) -> Semantic<(Attributes, Option<SymbolId>)> {
        let resolved = match node.tag() {
            Tag::Void => (Attributes::VOID, None),
            Tag::Int => (Attributes::INT, None),
            Tag::String => (Attributes::STRING, None),

            Tag::TypeId => (Attributes::STRUCT, Some(self.lookup_struct_tag(node, notes)?)),

            // Los punteros solo pueden apuntar a instancias de estructuras
            Tag::Ptr => {
                let tag = self.lookup_struct_tag(node.child(0)?, notes)?;
                (Attributes::STRUCT, Some(tag))
            }

            Tag::Array => {
                let element = node.child(0)?;
                if element.tag() == Tag::Array {
                    return Err(element.unexpected().into());
                }

                let (kind, structure) = self.type_of(element, notes)?;
                (Attributes::ARRAY | kind, structure)
            }

            _ => return Err(node.unexpected().into()),
        };

        Ok(resolved)
    }

    /// Asigna la lista de parámetros de una función.
    pub fn set_parameters(&mut self, function: SymbolId, parameters: Vec<SymbolId>) {
        self.symbols.get_mut(function).parameters = parameters;
    }

    /// Marca una función como definida.
    pub fn set_defined(&mut self, function: SymbolId) {
        self.symbols.get_mut(function).defined = true;
    }

    /// Toma ownership de la arena y las tablas persistentes.
    pub fn into_parts(self) -> (Symbols, SymbolTable, SymbolTable) {
        (self.symbols, self.structs, self.globals)
    }

    fn table_mut(&mut self, target: Target) -> &mut SymbolTable {
        match target {
            Target::Global => &mut self.globals,
            Target::Local => match &mut self.local {
                Some(local) => local,
                None => &mut self.globals,
            },

            Target::Fields(structure) => self
                .symbols
                .get_mut(structure)
                .fields
                .get_or_insert_with(SymbolTable::default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn at(line: u32, column: u32) -> Location {
        Location::point(&Source::new(0, "test"), line, column)
    }

    fn declarator(tag: Tag, name: &str, line: u32) -> Node {
        Node::new(tag, at(line, 1), tag.to_string()).adopt(Node::new(Tag::DeclId, at(line, 5), name))
    }

    #[test]
    fn duplicates_keep_the_original_binding() {
        let mut scopes = Scopes::default();
        let mut notes = Annotations::default();

        let first = declarator(Tag::Int, "a", 1);
        let second = declarator(Tag::String, "a", 2);

        let id = scopes
            .declare(&first, Target::Global, Role::Variable, None, &mut notes)
            .unwrap();

        let error = scopes
            .declare(&second, Target::Global, Role::Variable, None, &mut notes)
            .unwrap_err();

        assert!(matches!(error.val(), SemanticError::DuplicateDeclaration(name) if name == "a"));
        assert_eq!(scopes.globals().len(), 1);

        let rejected = second.declared_name().unwrap();
        assert_eq!(notes.symbol(rejected), None);
        assert_eq!(notes.symbol(first.declared_name().unwrap()), Some(id));
        assert_eq!(scopes.globals().get("a"), Some(id));

        let kept = &scopes.symbols()[id];
        assert_eq!(kept.location().key(), (0, 1, 5));
        assert_eq!(
            kept.attributes(),
            Attributes::INT | Attributes::VARIABLE | Attributes::LVAL
        );
    }

    #[test]
    fn locals_shadow_globals() {
        let mut scopes = Scopes::default();
        let mut notes = Annotations::default();

        let global = declarator(Tag::Int, "x", 1);
        scopes
            .declare(&global, Target::Global, Role::Variable, None, &mut notes)
            .unwrap();

        let block = scopes.enter();
        assert_eq!(block, 1);

        let param = declarator(Tag::String, "x", 2);
        let shadow = scopes
            .declare(&param, Target::Local, Role::Param, Some(0), &mut notes)
            .unwrap();

        let reference = Node::new(Tag::Ident, at(3, 1), "x");
        assert_eq!(scopes.lookup_variable(&reference, &mut notes).unwrap(), shadow);
        assert_eq!(scopes.symbols()[shadow].block(), 1);

        let locals = scopes.leave();
        assert_eq!(locals.len(), 1);
        assert_ne!(scopes.lookup_variable(&reference, &mut notes).unwrap(), shadow);

        let missing = Node::new(Tag::Ident, at(4, 1), "y");
        let error = scopes.lookup_variable(&missing, &mut notes).unwrap_err();
        assert!(matches!(error.val(), SemanticError::UndefinedVariable(name) if name == "y"));
    }

    #[test]
    fn blocks_are_never_reused() {
        let mut scopes = Scopes::default();
        let first = scopes.enter();
        scopes.leave();
        let second = scopes.enter();

        assert_eq!(scopes.block(), second);
        assert!(second > first && first > 0);
    }

    #[test]
    fn pointers_require_known_tags() {
        let mut scopes = Scopes::default();
        let mut notes = Annotations::default();

        let pointer = Node::new(Tag::Ptr, at(1, 1), "ptr")
            .adopt(Node::new(Tag::TypeId, at(1, 5), "node"))
            .adopt(Node::new(Tag::DeclId, at(1, 12), "head"));

        let error = scopes
            .declare(&pointer, Target::Global, Role::Variable, None, &mut notes)
            .unwrap_err();

        assert!(matches!(error.val(), SemanticError::UndefinedType(name) if name == "node"));
        assert!(scopes.globals().is_empty());

        let tag = Node::new(Tag::TypeId, at(0, 1), "node");
        let structure = scopes.declare_struct(&tag, &mut notes).unwrap();

        let again = Node::new(Tag::TypeId, at(9, 1), "node");
        assert!(scopes.declare_struct(&again, &mut notes).is_err());
        assert_eq!(notes.symbol(&again), None);
        let head = scopes
            .declare(&pointer, Target::Global, Role::Variable, None, &mut notes)
            .unwrap();

        assert_eq!(scopes.symbols().type_name(head), Some("node"));
        assert_eq!(scopes.symbols()[head].structure(), Some(structure));
    }
}
