//! Register type state and the deferred retyping of placeholder instructions.

use log::trace;

use crate::dex::error::DexError;
use crate::jvm::insn::Kind;
use crate::jvm::tree::CodeEvent;
use crate::translate::registers::{Group, RegisterType};
use crate::types::TypeSignature;

/// Placeholder instructions waiting for a register's type, grouped with union-find.
///
/// A group resolves at most once. Merging two unresolved groups makes one group whose
/// resolution retypes the sites of both; resolving a merged group through either handle
/// is the same resolution.
#[derive(Debug, Default)]
pub struct Patches {
    parent: Vec<usize>,
    sites: Vec<Vec<usize>>,
    wide: Vec<bool>,
    resolved: Vec<Option<TypeSignature>>,
}

impl Patches {
    pub fn new() -> Patches {
        Patches::default()
    }

    pub fn group(&mut self, wide: bool) -> Group {
        let id = self.parent.len();
        self.parent.push(id);
        self.sites.push(vec![]);
        self.wide.push(wide);
        self.resolved.push(None);
        Group(id)
    }

    fn root(&self, g: Group) -> usize {
        let mut i = g.0;
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    fn find(&mut self, g: Group) -> usize {
        let root = self.root(g);
        let mut i = g.0;
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    /// Records that the event at `site` must be retyped with the group.
    pub fn add_site(&mut self, g: Group, site: usize) {
        let root = self.find(g);
        self.sites[root].push(site);
    }

    pub fn resolution(&self, g: Group) -> Option<&TypeSignature> {
        self.resolved[self.root(g)].as_ref()
    }

    pub fn same_group(&mut self, a: Group, b: Group) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn union(&mut self, a: Group, b: Group) -> Group {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return Group(ra);
        }
        let moved = std::mem::take(&mut self.sites[rb]);
        self.sites[ra].extend(moved);
        self.parent[rb] = ra;
        Group(ra)
    }

    /// Fixes the type of every placeholder in the group.
    pub fn resolve(&mut self, g: Group, ty: &TypeSignature, events: &mut [CodeEvent]) -> Result<(), DexError> {
        let root = self.find(g);
        if self.resolved[root].is_some() {
            return Ok(());
        }
        trace!("Resolving group {} as {}", root, ty);
        self.resolved[root] = Some(ty.clone());
        for site in std::mem::take(&mut self.sites[root]) {
            match events.get_mut(site) {
                Some(CodeEvent::Insn(insn)) => insn.retype(ty)?,
                _ => untranslatable!("Patch site {} is not an instruction", site),
            }
        }
        Ok(())
    }

    /// Resolves every group nothing ever typed to the natural type of its width.
    pub fn resolve_defaults(&mut self, events: &mut [CodeEvent]) -> Result<(), DexError> {
        for root in 0..self.parent.len() {
            if self.parent[root] != root || self.resolved[root].is_some() {
                continue;
            }
            let ty = if self.wide[root] { TypeSignature::Long } else { TypeSignature::Int };
            self.resolve(Group(root), &ty, events)?;
        }
        Ok(())
    }
}

/// How control reaches a join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Branch,
    /// An exception thrown somewhere in a try block. Conflicts there are expected, since the
    /// handler sees the registers as they were at many different instructions.
    Handler,
}

/// The type of every register at one point of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    regs: Vec<RegisterType>,
}

impl Frame {
    pub fn new(registers: u16) -> Frame {
        Frame { regs: vec![RegisterType::Unknown; registers as usize] }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// The register's state, with resolved groups replaced by their type.
    pub fn get(&self, reg: u16, patches: &Patches) -> Result<RegisterType, DexError> {
        let Some(t) = self.regs.get(reg as usize) else {
            untranslatable!("Register v{} is outside the frame of {}", reg, self.regs.len());
        };
        Ok(normalize(t, patches))
    }

    pub fn set(&mut self, reg: u16, ty: RegisterType) -> Result<(), DexError> {
        let r = reg as usize;
        if r >= self.regs.len() || (ty.is_wide() && r + 1 >= self.regs.len()) {
            untranslatable!("Register v{} ({}) is outside the frame of {}", reg, ty, self.regs.len());
        }
        // a write into the upper half of a wide pair kills the pair
        if r > 0 && self.regs[r - 1].is_wide() {
            self.regs[r - 1] = RegisterType::Unknown;
        }
        if ty.is_wide() {
            self.regs[r + 1] = RegisterType::Unknown;
        }
        self.regs[r] = ty;
        Ok(())
    }

    /// Merges `incoming` into this frame, register by register.
    pub fn merge(&mut self, incoming: &Frame, arrival: Arrival, patches: &mut Patches, events: &mut [CodeEvent]) -> Result<(), DexError> {
        if incoming.regs.len() != self.regs.len() {
            untranslatable!("Frames of {} and {} registers cannot be merged", self.regs.len(), incoming.regs.len());
        }
        for r in 0..self.regs.len() {
            let here = normalize(&self.regs[r], patches);
            let there = normalize(&incoming.regs[r], patches);
            self.regs[r] = merge_one(here, there, arrival, patches, events).map_err(|e| err!(e, "v{}", r))?;
        }
        Ok(())
    }
}

fn normalize(t: &RegisterType, patches: &Patches) -> RegisterType {
    match t.group().and_then(|g| patches.resolution(g)) {
        Some(resolved) => RegisterType::Concrete(resolved.clone()),
        None => t.clone(),
    }
}

fn same_kind(a: &TypeSignature, b: &TypeSignature) -> bool {
    a.kind() == b.kind()
}

fn merge_one(
    here: RegisterType,
    there: RegisterType,
    arrival: Arrival,
    patches: &mut Patches,
    events: &mut [CodeEvent],
) -> Result<RegisterType, DexError> {
    use RegisterType::*;

    let conflict = |a: &RegisterType, b: &RegisterType| -> Result<RegisterType, DexError> {
        match arrival {
            Arrival::Handler => Ok(Unknown),
            Arrival::Branch => untranslatable!("Conflicting register types {} and {} at a join", a, b),
        }
    };

    Ok(match (&here, &there) {
        (Unknown, _) | (_, Unknown) => Unknown,
        (Concrete(a), Concrete(b)) if a == b => here.clone(),
        // references of different classes stay references; the writer computes the common type
        (Concrete(a), Concrete(b)) if same_kind(a, b) && a.kind() == Some(Kind::Reference) => here.clone(),
        // int, short, char, byte and boolean share one slot kind
        (Concrete(a), Concrete(b)) if same_kind(a, b) => Concrete(TypeSignature::Int),
        (Concrete(_), Concrete(_)) => conflict(&here, &there)?,
        // a handler sees a register as it was before different instructions, so the values
        // need not be one value
        (Untyped32(a), Untyped32(b)) | (Untyped64(a), Untyped64(b))
            if arrival == Arrival::Handler && !patches.same_group(*a, *b) => Unknown,
        (Untyped32(a), Untyped32(b)) | (Untyped64(a), Untyped64(b)) => {
            let g = patches.union(*a, *b);
            if here.is_wide() { Untyped64(g) } else { Untyped32(g) }
        }
        (Untyped32(_), Untyped64(_)) | (Untyped64(_), Untyped32(_)) => conflict(&here, &there)?,
        (Untyped32(g) | Untyped64(g), Concrete(t)) | (Concrete(t), Untyped32(g) | Untyped64(g)) => {
            let untyped = if matches!(here, Concrete(_)) { &there } else { &here };
            if t.is_wide() != untyped.is_wide() {
                return conflict(&here, &there);
            }
            match arrival {
                Arrival::Branch => {
                    patches.resolve(*g, t, events)?;
                    Concrete(t.clone())
                }
                Arrival::Handler => Unknown,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::insn::Constant;
    use crate::jvm::Insn;

    fn placeholder(events: &mut Vec<CodeEvent>, patches: &mut Patches, value: i32, slot: u16) -> Group {
        let g = patches.group(false);
        patches.add_site(g, events.len());
        events.push(CodeEvent::Insn(Insn::Const(Constant::Int(value))));
        patches.add_site(g, events.len());
        events.push(CodeEvent::Insn(Insn::Store(Kind::Int, slot)));
        g
    }

    #[test]
    fn merged_groups_resolve_together() {
        let mut events = vec![];
        let mut patches = Patches::new();
        let a = placeholder(&mut events, &mut patches, 0x3f80_0000, 0);
        let b = placeholder(&mut events, &mut patches, 0x4000_0000, 0);

        let mut left = Frame::new(1);
        left.set(0, RegisterType::Untyped32(a)).unwrap();
        let mut right = Frame::new(1);
        right.set(0, RegisterType::Untyped32(b)).unwrap();
        left.merge(&right, Arrival::Branch, &mut patches, &mut events).unwrap();

        let g = left.get(0, &patches).unwrap().group().unwrap();
        patches.resolve(g, &TypeSignature::Float, &mut events).unwrap();
        assert_eq!(
            events,
            vec![
                CodeEvent::Insn(Insn::Const(Constant::Float(1.0))),
                CodeEvent::Insn(Insn::Store(Kind::Float, 0)),
                CodeEvent::Insn(Insn::Const(Constant::Float(2.0))),
                CodeEvent::Insn(Insn::Store(Kind::Float, 0)),
            ]
        );
        assert_eq!(right.get(0, &patches).unwrap(), RegisterType::Concrete(TypeSignature::Float));
    }

    #[test]
    fn handler_keeps_distinct_groups_apart() {
        let mut events = vec![];
        let mut patches = Patches::new();
        let a = placeholder(&mut events, &mut patches, 0, 0);
        let b = placeholder(&mut events, &mut patches, 0x3f80_0000, 0);

        let mut stored = Frame::new(2);
        stored.set(0, RegisterType::Untyped32(a)).unwrap();
        stored.set(1, RegisterType::Untyped32(a)).unwrap();
        let mut incoming = Frame::new(2);
        incoming.set(0, RegisterType::Untyped32(b)).unwrap();
        incoming.set(1, RegisterType::Untyped32(a)).unwrap();
        stored.merge(&incoming, Arrival::Handler, &mut patches, &mut events).unwrap();

        assert_eq!(stored.get(0, &patches).unwrap(), RegisterType::Unknown);
        assert_eq!(stored.get(1, &patches).unwrap(), RegisterType::Untyped32(a));
        assert!(!patches.same_group(a, b));

        patches.resolve(a, &TypeSignature::Int, &mut events).unwrap();
        patches.resolve(b, &TypeSignature::Float, &mut events).unwrap();
        assert_eq!(events[2], CodeEvent::Insn(Insn::Const(Constant::Float(1.0))));
        assert_eq!(events[3], CodeEvent::Insn(Insn::Store(Kind::Float, 0)));
    }

    #[test]
    fn resolving_twice_applies_once() {
        let mut events = vec![];
        let mut patches = Patches::new();
        let g = placeholder(&mut events, &mut patches, 0, 0);
        patches.resolve(g, &TypeSignature::object("java/lang/String"), &mut events).unwrap();
        patches.resolve(g, &TypeSignature::Float, &mut events).unwrap();
        assert_eq!(events[0], CodeEvent::Insn(Insn::Const(Constant::Null)));
        assert_eq!(events[1], CodeEvent::Insn(Insn::Store(Kind::Reference, 0)));
    }

    #[test]
    fn untyped_meets_concrete_at_a_branch() {
        let mut events = vec![];
        let mut patches = Patches::new();
        let g = placeholder(&mut events, &mut patches, 0, 1);
        let mut stored = Frame::new(2);
        stored.set(1, RegisterType::Untyped32(g)).unwrap();
        let mut incoming = Frame::new(2);
        incoming.set(1, RegisterType::Concrete(TypeSignature::Float)).unwrap();
        stored.merge(&incoming, Arrival::Branch, &mut patches, &mut events).unwrap();
        assert_eq!(stored.get(1, &patches).unwrap(), RegisterType::Concrete(TypeSignature::Float));
        assert_eq!(events[1], CodeEvent::Insn(Insn::Store(Kind::Float, 1)));
    }

    #[test]
    fn concrete_conflicts_fail_at_branches_only() {
        let mut events = vec![];
        let mut patches = Patches::new();
        let mut a = Frame::new(1);
        a.set(0, RegisterType::Concrete(TypeSignature::Int)).unwrap();
        let mut b = Frame::new(1);
        b.set(0, RegisterType::Concrete(TypeSignature::Float)).unwrap();

        let e = a.clone().merge(&b, Arrival::Branch, &mut patches, &mut events).unwrap_err();
        assert!(e.is_translation());
        a.merge(&b, Arrival::Handler, &mut patches, &mut events).unwrap();
        assert_eq!(a.get(0, &patches).unwrap(), RegisterType::Unknown);
    }

    #[test]
    fn wide_writes_invalidate_their_neighbours() {
        let mut f = Frame::new(4);
        let patches = Patches::new();
        f.set(0, RegisterType::Concrete(TypeSignature::Long)).unwrap();
        f.set(2, RegisterType::Concrete(TypeSignature::Int)).unwrap();
        f.set(1, RegisterType::Concrete(TypeSignature::Int)).unwrap();
        assert_eq!(f.get(0, &patches).unwrap(), RegisterType::Unknown);
        f.set(2, RegisterType::Concrete(TypeSignature::Double)).unwrap();
        assert_eq!(f.get(3, &patches).unwrap(), RegisterType::Unknown);
        assert!(f.set(3, RegisterType::Concrete(TypeSignature::Double)).is_err());
    }

    #[test]
    fn unresolved_groups_default_by_width() {
        let mut events = vec![CodeEvent::Insn(Insn::Const(Constant::Long(7))), CodeEvent::Insn(Insn::Store(Kind::Long, 0))];
        let mut patches = Patches::new();
        let g = patches.group(true);
        patches.add_site(g, 0);
        patches.add_site(g, 1);
        let h = patches.group(false);
        patches.resolve_defaults(&mut events).unwrap();
        assert_eq!(events[0], CodeEvent::Insn(Insn::Const(Constant::Long(7))));
        assert_eq!(patches.resolution(g), Some(&TypeSignature::Long));
        assert_eq!(patches.resolution(h), Some(&TypeSignature::Int));
    }
}
