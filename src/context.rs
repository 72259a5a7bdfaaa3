use crate::types::Pt;

/// A structural boundary entered by the walker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scope {
    Table,
    /// An enclosing table is measuring its cells; nested tables only report extents.
    TableSizing,
    List,
    /// Paragraph indentation steps.
    Indent(usize),
    Inline,
    License,
    References,
    Gallery,
    Center,
    Column { width: Option<Pt>, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ContextState {
    table_depth: usize,
    sizing_depth: usize,
    list_depth: usize,
    para_indent: usize,
    inline_depth: usize,
    license_mode: bool,
    reference_mode: bool,
    gallery_mode: bool,
    center_depth: usize,
    column_width: Option<Pt>,
    column_count: usize,
}

/// Nesting state carried down one document walk.
///
/// Every change goes through [`LayoutContext::push`] and is undone by the
/// matching [`LayoutContext::pop`], which restores the exact prior state.
#[derive(Debug, Clone, Default)]
pub struct LayoutContext {
    state: ContextState,
    stack: Vec<(Scope, ContextState)>,
}

impl LayoutContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope) {
        self.stack.push((scope, self.state));
        let state = &mut self.state;
        match scope {
            Scope::Table => state.table_depth += 1,
            Scope::TableSizing => state.sizing_depth += 1,
            Scope::List => state.list_depth += 1,
            Scope::Indent(steps) => state.para_indent += steps,
            Scope::Inline => state.inline_depth += 1,
            Scope::License => state.license_mode = true,
            Scope::References => state.reference_mode = true,
            Scope::Gallery => state.gallery_mode = true,
            Scope::Center => state.center_depth += 1,
            Scope::Column { width, count } => {
                state.column_width = width;
                state.column_count = count;
            }
        }
    }

    pub fn pop(&mut self) -> Option<Scope> {
        let (scope, previous) = self.stack.pop()?;
        self.state = previous;
        Some(scope)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn table_depth(&self) -> usize {
        self.state.table_depth
    }

    pub fn in_table(&self) -> bool {
        self.state.table_depth > 0
    }

    pub fn is_sizing(&self) -> bool {
        self.state.sizing_depth > 0
    }

    pub fn list_depth(&self) -> usize {
        self.state.list_depth
    }

    pub fn para_indent(&self) -> usize {
        self.state.para_indent
    }

    pub fn in_inline(&self) -> bool {
        self.state.inline_depth > 0
    }

    pub fn license_mode(&self) -> bool {
        self.state.license_mode
    }

    pub fn reference_mode(&self) -> bool {
        self.state.reference_mode
    }

    pub fn gallery_mode(&self) -> bool {
        self.state.gallery_mode
    }

    pub fn in_center(&self) -> bool {
        self.state.center_depth > 0
    }

    pub fn column_width(&self) -> Option<Pt> {
        self.state.column_width
    }

    pub fn column_count(&self) -> usize {
        self.state.column_count
    }

    /// Indentation steps for list items: list depth plus paragraph indent.
    pub fn list_indent_level(&self) -> usize {
        self.state.list_depth + self.state.para_indent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_restores_previous_state() {
        let mut ctx = LayoutContext::new();
        ctx.push(Scope::Table);
        ctx.push(Scope::Column {
            width: Some(Pt::from_i32(120)),
            count: 3,
        });
        ctx.push(Scope::Indent(2));
        assert_eq!(ctx.table_depth(), 1);
        assert_eq!(ctx.column_width(), Some(Pt::from_i32(120)));
        assert_eq!(ctx.para_indent(), 2);

        assert_eq!(ctx.pop(), Some(Scope::Indent(2)));
        assert_eq!(ctx.para_indent(), 0);
        ctx.pop();
        assert_eq!(ctx.column_width(), None);
        assert_eq!(ctx.column_count(), 0);
        ctx.pop();
        assert!(!ctx.in_table());
        assert_eq!(ctx.pop(), None);
    }

    #[test]
    fn nested_flags_survive_inner_pop() {
        let mut ctx = LayoutContext::new();
        ctx.push(Scope::License);
        ctx.push(Scope::License);
        ctx.pop();
        assert!(ctx.license_mode());
        ctx.pop();
        assert!(!ctx.license_mode());
    }

    #[test]
    fn list_indent_combines_list_and_paragraph_depth() {
        let mut ctx = LayoutContext::new();
        ctx.push(Scope::Indent(1));
        ctx.push(Scope::List);
        ctx.push(Scope::List);
        assert_eq!(ctx.list_indent_level(), 3);
        assert_eq!(ctx.depth(), 3);
    }
}
