//! The closed vocabulary of node kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

macro_rules! tags {
    ($($variant:ident),* $(,)?) => {
        /// Kind of a syntax tree node.
        ///
        /// The canonical name of every variant is its identifier, e.g. `OtherKeyword`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Tag {
            $($variant,)*
        }

        impl Tag {
            /// Every tag, in declaration order.
            pub const ALL: &'static [Tag] = &[$(Tag::$variant,)*];

            /// Canonical name used by the notation, JSON and dumps.
            pub fn name(self) -> &'static str {
                match self {
                    $(Tag::$variant => stringify!($variant),)*
                }
            }
        }

        impl FromStr for Tag {
            type Err = ConvertError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Tag::$variant),)*
                    _ => Err(ConvertError::UnknownTag(s.to_string())),
                }
            }
        }
    };
}

tags! {
    Root,
    Statement,
    Clause,
    SetOperatorClause,
    InsertClause,
    BeginEndBlock,
    TryBlock,
    CatchBlock,
    BatchSeparator,
    CaseStatement,
    CaseInput,
    CaseWhen,
    CaseThen,
    CaseElse,
    IfStatement,
    ElseClause,
    WhileLoop,
    DdlAsBlock,
    DdlProceduralBlock,
    DdlOtherBlock,
    DdlDeclareBlock,
    DdlParens,
    DdlDetailParens,
    DdlReturns,
    DdlWithClause,
    CursorDeclaration,
    CursorForBlock,
    CursorForOptions,
    BooleanExpression,
    BeginTransaction,
    SaveTransaction,
    CommitTransaction,
    RollbackTransaction,
    ContainerOpen,
    ContainerMultiStatement,
    ContainerSingleStatement,
    ContainerGeneralContent,
    ContainerClose,
    SelectionTarget,
    SelectionTargetParens,
    ExpressionParens,
    FunctionParens,
    InParens,
    MergeClause,
    MergeTarget,
    MergeUsing,
    MergeCondition,
    MergeWhen,
    MergeThen,
    MergeAction,
    JoinOnSection,
    CteWithClause,
    CteAlias,
    CteAsBlock,
    TriggerCondition,
    PermissionsBlock,
    PermissionsDetail,
    PermissionsTarget,
    PermissionsRecipient,
    CompoundKeyword,
    BetweenCondition,
    BetweenLowerBound,
    BetweenUpperBound,
    AndOperator,
    OrOperator,
    AlphaOperator,
    OtherOperator,
    EqualsSign,
    Comma,
    Period,
    Semicolon,
    ScopeResolutionOperator,
    Asterisk,
    FunctionKeyword,
    DataTypeKeyword,
    OtherKeyword,
    PseudoName,
    WhiteSpace,
    OtherNode,
    CommentSingleLine,
    CommentSingleLineCStyle,
    CommentMultiLine,
    String,
    NString,
    QuotedString,
    BracketQuotedName,
    NumberValue,
    MonetaryValue,
    BinaryValue,
    Label,
}

impl Tag {
    /// Containers whose brackets are implied by the tag.
    pub fn is_parens(self) -> bool {
        matches!(
            self,
            Tag::ExpressionParens
                | Tag::FunctionParens
                | Tag::InParens
                | Tag::DdlParens
                | Tag::DdlDetailParens
                | Tag::SelectionTargetParens
        )
    }

    pub fn is_comment(self) -> bool {
        matches!(
            self,
            Tag::CommentSingleLine | Tag::CommentSingleLineCStyle | Tag::CommentMultiLine
        )
    }

    /// Leaf tags that carry source text.
    pub fn is_token(self) -> bool {
        matches!(
            self,
            Tag::AndOperator
                | Tag::OrOperator
                | Tag::AlphaOperator
                | Tag::OtherOperator
                | Tag::EqualsSign
                | Tag::Comma
                | Tag::Period
                | Tag::Semicolon
                | Tag::ScopeResolutionOperator
                | Tag::Asterisk
                | Tag::FunctionKeyword
                | Tag::DataTypeKeyword
                | Tag::OtherKeyword
                | Tag::PseudoName
                | Tag::WhiteSpace
                | Tag::OtherNode
                | Tag::String
                | Tag::NString
                | Tag::QuotedString
                | Tag::BracketQuotedName
                | Tag::NumberValue
                | Tag::MonetaryValue
                | Tag::BinaryValue
                | Tag::Label
        ) || self.is_comment()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for tag in Tag::ALL {
            assert_eq!(tag.name().parse::<Tag>().unwrap(), *tag);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = "Bogus".parse::<Tag>().unwrap_err();
        assert!(matches!(err, ConvertError::UnknownTag(ref t) if t == "Bogus"));
    }

    #[test]
    fn test_classification() {
        assert!(Tag::FunctionParens.is_parens());
        assert!(!Tag::Clause.is_parens());
        assert!(Tag::CommentSingleLineCStyle.is_comment());
        assert!(Tag::OtherNode.is_token());
        assert!(!Tag::Statement.is_token());
    }
}
