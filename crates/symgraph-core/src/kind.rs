use serde::{Deserialize, Serialize};

/// Whether a symbol name should be matched with function-call tolerance.
///
/// Locals and parameters get qualified names of the form
/// `foo(int)::bar`, so a lookup for `foo` must not accidentally match them;
/// see `match_symbol_name` in the query layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NameMatchMode {
    MaybeFunction,
    NonFunction,
}

/// The kind of a symbol record.
///
/// This is the project-core's own vocabulary; the parser front-end maps its
/// language-specific cursor kinds onto it before emitting index results.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SymbolKind {
    Invalid,
    Namespace,
    Class,
    Struct,
    Enum,
    EnumConstant,
    Typedef,
    Function,
    Method,
    Constructor,
    Destructor,
    Variable,
    Parameter,
    Field,
    Macro,
    Include,
    // Reference kinds.
    Call,
    Ref,
    TypeRef,
    MacroExpansion,
    InclusionDirective,
}

impl SymbolKind {
    /// Reference kinds never answer name queries and never count as
    /// declarations or definitions.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            SymbolKind::Call
                | SymbolKind::Ref
                | SymbolKind::TypeRef
                | SymbolKind::MacroExpansion
                | SymbolKind::InclusionDirective
        )
    }

    pub fn is_class(self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Struct)
    }

    /// Rank used when choosing the best target out of a set of candidates.
    /// Higher wins; ties are broken in favor of definitions.
    pub fn target_rank(self) -> i32 {
        match self {
            SymbolKind::Class | SymbolKind::Struct => 0,
            // Must beat the class/struct declaration so constructor calls
            // resolve to the constructor, not the type.
            SymbolKind::Constructor => 1,
            SymbolKind::TypeRef => 3,
            SymbolKind::Field
            | SymbolKind::Variable
            | SymbolKind::Function
            | SymbolKind::Method => 4,
            SymbolKind::Macro => 5,
            _ => 2,
        }
    }

    /// How `match_symbol_name` should treat stored names of this kind.
    pub fn name_match_mode(self) -> NameMatchMode {
        match self {
            SymbolKind::Variable | SymbolKind::Parameter => NameMatchMode::MaybeFunction,
            _ => NameMatchMode::NonFunction,
        }
    }
}

impl Default for SymbolKind {
    fn default() -> Self {
        SymbolKind::Invalid
    }
}
