use crate::engine::{Breakpoint, DebugEngine};
use anyhow::anyhow;
use itertools::Itertools;

/// Client side breakpoint list of the line oriented front ends (MI and CLI).
///
/// The engine replaces breakpoints per source file, so every change sends the whole
/// line set of the touched file.
#[derive(Default)]
pub struct BreakpointBook {
    entries: Vec<Breakpoint>,
}

impl BreakpointBook {
    fn lines_of(&self, file: &str) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|bp| bp.file == file)
            .map(|bp| bp.line)
            .collect()
    }

    fn sync_file(
        &mut self,
        engine: &mut dyn DebugEngine,
        file: &str,
        lines: &[u32],
    ) -> anyhow::Result<()> {
        let updated = engine.set_breakpoints(file, lines)?;
        self.entries.retain(|bp| bp.file != file);
        self.entries.extend(updated);
        self.entries.sort_by_key(|bp| bp.id);
        Ok(())
    }

    /// Add a breakpoint at `file:line`, return the engine view of it.
    pub fn insert(
        &mut self,
        engine: &mut dyn DebugEngine,
        file: &str,
        line: u32,
    ) -> anyhow::Result<Breakpoint> {
        let mut lines = self.lines_of(file);
        lines.push(line);
        self.sync_file(engine, file, &lines)?;

        self.entries
            .iter()
            .find(|bp| bp.file == file && bp.line == line)
            .cloned()
            .ok_or_else(|| anyhow!("engine rejected breakpoint at {file}:{line}"))
    }

    /// Remove a breakpoint by its number.
    pub fn remove(&mut self, engine: &mut dyn DebugEngine, id: u32) -> anyhow::Result<Breakpoint> {
        let bp = self
            .entries
            .iter()
            .find(|bp| bp.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("no breakpoint number {id}"))?;

        let lines = self
            .lines_of(&bp.file)
            .into_iter()
            .filter(|&line| line != bp.line)
            .collect_vec();
        self.sync_file(engine, &bp.file, &lines)?;
        Ok(bp)
    }

    pub fn list(&self) -> &[Breakpoint] {
        &self.entries
    }
}
