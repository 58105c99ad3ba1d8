//! Emit function bodies and translation-unit dispatch.

use super::CodeGenerator;
use crate::compiler::ast::{AstNodeId, NodePayload};
use crate::error::Result;

impl CodeGenerator<'_> {
    /// A Function opens the scratch variable used by categorical tests and
    /// emits its children in order.
    pub(crate) fn emit_function(&mut self, id: AstNodeId) -> Result<()> {
        self.code.push_fragment("unsigned int tmp;");
        for child in self.ast.node(id).children.clone() {
            self.emit(child)?;
        }
        Ok(())
    }

    /// A TranslationUnit becomes a call in the enclosing function, a
    /// prototype in the header and a standalone `tu{id}.c` holding the
    /// unit's trees.
    pub(crate) fn emit_translation_unit(&mut self, id: AstNodeId) -> Result<()> {
        let unit_id = match self.ast.node(id).payload {
            NodePayload::TranslationUnit { unit_id } => unit_id,
            _ => unreachable!("emit_translation_unit on a non-TU node"),
        };
        let leaf_output_ctype = self.leaf_output_ctype();
        let signature = format!(
            "void predict_unit{unit_id}(union Entry* data, {leaf_output_ctype}* result)"
        );

        self.code.push_fragment(format!("predict_unit{unit_id}(data, result);"));

        let caller_file = self.code.current_file();
        self.code.switch_to_file("header.h");
        self.code.push_fragment(format!("{signature};"));

        self.code.switch_to_file(&format!("tu{unit_id}.c"));
        self.code.push_fragment(format!("#include \"header.h\"\n\n{signature} {{"));
        self.code.change_indent(1);
        debug_assert_eq!(self.ast.node(id).children.len(), 1);
        self.emit(self.ast.node(id).children[0])?;
        self.code.change_indent(-1);
        self.code.push_fragment("}");

        self.code.switch_to_file(&caller_file);
        Ok(())
    }
}
