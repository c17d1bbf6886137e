//! Lazy vertex-graph evaluator.
//!
//! # Model
//!
//! Evaluation builds an arena of vertices, one per reachable path. A vertex
//! starts out with its *seed* conjuncts: the expressions declared for its
//! path, each paired with the environment it was written in. Processing a
//! vertex unifies its conjuncts into a [`Val`], creates arcs for struct
//! fields and list elements, and resolves disjunctions by evaluating every
//! alternative in a clone vertex and forwarding to the survivor.
//!
//! Arcs are processed on demand, so only the parts of a schema that are
//! looked up, referenced, or validated are ever evaluated.
//!
//! # References
//!
//! A reference used as a value copies the seed conjuncts of its target, and
//! the copy is re-evaluated in place: lexical references inside copied
//! struct literals bind to the copy. Reaching a target through a definition
//! closes the copied literals.
//!
//! # Fills
//!
//! A fill is a conjunct attached to an absolute path; it joins the seeds of
//! the vertex at that path when the vertex is created. While the
//! disjunctions of a vertex are decided, fills strictly below it are
//! withheld, so a fill narrows the chosen alternative rather than
//! re-deciding its ancestors.

use std::collections::VecDeque;
use std::mem;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value as Json};
use tracing::trace;

use crate::ast::{BinaryOp, Decl, Expr, File, Label, StructLit};
use crate::builtins::{self, Builtin};
use crate::encode::scalar_to_json;
use crate::error::{ErrorKind, EvalError};
use crate::kind::{Bound, BoundOp, Constraint, Kind, Scalar, Val};
use crate::ops;
use crate::path::{Path, Selector};

pub(crate) type VertexId = usize;
type EnvId = usize;

const ROOT: VertexId = 0;
const PLAIN_ENV: EnvId = 0;
pub(crate) const MAX_DEPTH: usize = 256;
const MAX_COMBINATIONS: usize = 256;

/// A source unified into the root of a graph.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Input<'p> {
    File(&'p File),
    Expr(&'p Expr),
}

#[derive(Debug, Clone, Copy)]
enum Env<'p> {
    Root {
        imports: &'p [String],
    },
    Struct {
        parent: EnvId,
        lit: &'p StructLit,
        vertex: VertexId,
    },
}

#[derive(Debug, Clone)]
enum Source<'p> {
    Expr(&'p Expr),
    Error(EvalError),
}

#[derive(Debug, Clone)]
struct Conjunct<'p> {
    source: Source<'p>,
    env: EnvId,
    /// Struct literals from this conjunct only allow their declared fields.
    closed: bool,
    /// Closedness group an embedding contributes its labels to.
    group: Option<usize>,
}

impl<'p> Conjunct<'p> {
    fn expr(expr: &'p Expr, env: EnvId, closed: bool) -> Self {
        Self {
            source: Source::Expr(expr),
            env,
            closed,
            group: None,
        }
    }

    fn error(error: EvalError) -> Self {
        Self {
            source: Source::Error(error),
            env: PLAIN_ENV,
            closed: false,
            group: None,
        }
    }
}

type Alternative<'p> = (Conjunct<'p>, bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Processing,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Arc {
    vertex: VertexId,
    required: bool,
}

/// The labels one closed struct literal allows.
#[derive(Debug, Clone, Default)]
struct Group<'p> {
    labels: Vec<Label>,
    patterns: Vec<(&'p Expr, EnvId)>,
    open: bool,
}

#[derive(Debug, Clone, Copy)]
struct Pattern<'p> {
    label: &'p Expr,
    value: &'p Expr,
    env: EnvId,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct ListConj<'p> {
    elems: &'p [Expr],
    tail: Option<&'p Expr>,
    env: EnvId,
    closed: bool,
}

#[derive(Debug)]
struct Vertex<'p> {
    parent: Option<VertexId>,
    /// Absolute path first, then the paths of copied references.
    paths: Vec<Path>,
    seeds: Vec<Conjunct<'p>>,
    state: State,
    val: Val,
    /// Incomplete errors: the value is not concrete yet.
    pending: Vec<EvalError>,
    arcs: IndexMap<Label, Arc>,
    elems: Vec<VertexId>,
    /// The list may still grow: none of its list conjuncts had a fixed length.
    open_list: bool,
    groups: Vec<Group<'p>>,
    patterns: Vec<Pattern<'p>>,
    lists: Vec<ListConj<'p>>,
    copied: FxHashSet<VertexId>,
    forward: Option<VertexId>,
    /// Surviving alternatives of an unresolved disjunction.
    disjuncts: Vec<VertexId>,
}

impl<'p> Vertex<'p> {
    fn new(parent: Option<VertexId>, paths: Vec<Path>, seeds: Vec<Conjunct<'p>>) -> Self {
        Self {
            parent,
            paths,
            seeds,
            state: State::Pending,
            val: Val::top(),
            pending: Vec::new(),
            arcs: IndexMap::new(),
            elems: Vec::new(),
            open_list: false,
            groups: Vec::new(),
            patterns: Vec::new(),
            lists: Vec::new(),
            copied: FxHashSet::default(),
            forward: None,
            disjuncts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Resolved<'p> {
    Vertex(VertexId),
    Val(Val),
    Builtin(Builtin),
    Package(&'p str),
}

/// One evaluation of a set of sources plus fills.
pub(crate) struct Graph<'p> {
    vertices: Vec<Vertex<'p>>,
    envs: Vec<Env<'p>>,
    fills: Vec<(&'p Path, Source<'p>)>,
    withheld: Vec<Path>,
    depth: usize,
}

impl<'p> Graph<'p> {
    /// Create a graph whose root unifies all inputs.
    pub(crate) fn new(
        inputs: impl IntoIterator<Item = Input<'p>>,
        fills: impl IntoIterator<Item = (&'p Path, Result<&'p Expr, &'p EvalError>)>,
    ) -> Self {
        let mut graph = Graph {
            vertices: Vec::new(),
            envs: vec![Env::Root { imports: &[] }],
            fills: fills
                .into_iter()
                .map(|(path, source)| {
                    let source = match source {
                        Ok(expr) => Source::Expr(expr),
                        Err(error) => Source::Error(error.clone()),
                    };
                    (path, source)
                })
                .collect(),
            withheld: Vec::new(),
            depth: 0,
        };

        let mut seeds = Vec::new();
        for input in inputs {
            match input {
                Input::File(file) => {
                    let env = graph.new_env(Env::Root {
                        imports: &file.imports,
                    });
                    seeds.push(Conjunct::expr(&file.body, env, false));
                }
                Input::Expr(expr) => seeds.push(Conjunct::expr(expr, PLAIN_ENV, false)),
            }
        }
        let paths = vec![Path::root()];
        seeds.extend(graph.fill_conjuncts(&paths));
        graph.new_vertex(None, paths, seeds);
        graph
    }

    // ============================================================
    // Queries
    // ============================================================

    /// Find the vertex at `path`, evaluated.
    pub(crate) fn lookup(&mut self, path: &Path) -> Result<VertexId, EvalError> {
        let mut vertex = ROOT;
        for selector in path.selectors() {
            vertex = self.select(vertex, selector)?;
        }
        self.process(vertex);
        let vertex = self.follow(vertex);
        self.process(vertex);
        Ok(vertex)
    }

    /// All errors under a vertex; with `concrete`, also every value that is not concrete.
    pub(crate) fn validate(&mut self, vertex: VertexId, concrete: bool) -> Vec<EvalError> {
        let mut errors = Vec::new();
        self.collect(vertex, concrete, &mut errors, 0);
        errors
    }

    /// The error of this vertex itself, if it is bottom.
    pub(crate) fn error(&mut self, vertex: VertexId) -> Option<EvalError> {
        self.process(vertex);
        let vertex = self.follow(vertex);
        match &self.vertices[vertex].val {
            Val::Bottom(error) => Some(error.clone().at(self.path_string(vertex))),
            _ => None,
        }
    }

    /// The kinds the vertex may still take.
    pub(crate) fn kind(&mut self, vertex: VertexId) -> Kind {
        self.process(vertex);
        let vertex = self.follow(vertex);
        self.vertices[vertex].val.kinds()
    }

    /// The selectors of the (non-optional) fields of a struct.
    pub(crate) fn fields(&mut self, vertex: VertexId) -> Result<Vec<Selector>, EvalError> {
        self.process(vertex);
        let vertex = self.follow(vertex);
        self.usable(vertex)?;
        let node = &self.vertices[vertex];
        if !node.val.kinds().contains(Kind::STRUCT) {
            return Err(EvalError::conflict(format!("cannot enumerate fields of {}", node.val))
                .at(self.path_string(vertex)));
        }
        Ok(self
            .required_arcs(vertex, false)
            .iter()
            .map(|(label, _)| Selector::from(label))
            .collect())
    }

    /// The number of elements of a list.
    pub(crate) fn list_len(&mut self, vertex: VertexId) -> Result<usize, EvalError> {
        self.process(vertex);
        let vertex = self.follow(vertex);
        self.usable(vertex)?;
        let node = &self.vertices[vertex];
        if node.val.kinds() != Kind::LIST {
            return Err(EvalError::conflict(format!("{} is not a list", node.val))
                .at(self.path_string(vertex)));
        }
        Ok(node.elems.len())
    }

    /// Export a concrete vertex to JSON.
    pub(crate) fn export(&mut self, vertex: VertexId) -> Result<Json, EvalError> {
        self.export_at(vertex, 0)
    }

    fn usable(&self, vertex: VertexId) -> Result<(), EvalError> {
        let node = &self.vertices[vertex];
        let error = match &node.val {
            Val::Bottom(error) => Some(error.clone()),
            _ if !node.disjuncts.is_empty() => node.pending.last().cloned(),
            _ => None,
        };
        match error {
            Some(error) => Err(error.at(self.path_string(vertex))),
            None => Ok(()),
        }
    }

    // ============================================================
    // Vertices and fills
    // ============================================================

    fn new_env(&mut self, env: Env<'p>) -> EnvId {
        self.envs.push(env);
        self.envs.len() - 1
    }

    fn new_vertex(
        &mut self,
        parent: Option<VertexId>,
        paths: Vec<Path>,
        seeds: Vec<Conjunct<'p>>,
    ) -> VertexId {
        self.vertices.push(Vertex::new(parent, paths, seeds));
        self.vertices.len() - 1
    }

    /// A detached vertex for evaluating an expression on its own.
    fn temp(&mut self, expr: &'p Expr, env: EnvId) -> VertexId {
        self.new_vertex(None, Vec::new(), vec![Conjunct::expr(expr, env, false)])
    }

    fn follow(&self, mut vertex: VertexId) -> VertexId {
        while let Some(next) = self.vertices[vertex].forward {
            vertex = next;
        }
        vertex
    }

    fn path_string(&self, vertex: VertexId) -> String {
        self.vertices[vertex]
            .paths
            .first()
            .map(Path::to_string)
            .unwrap_or_default()
    }

    fn is_withheld(&self, fill: &Path) -> bool {
        self.withheld
            .iter()
            .any(|path| fill.len() > path.len() && fill.starts_with(path))
    }

    fn fill_conjuncts(&self, paths: &[Path]) -> Vec<Conjunct<'p>> {
        self.fills
            .iter()
            .filter(|(fill, _)| paths.iter().any(|path| path == *fill) && !self.is_withheld(fill))
            .map(|(_, source)| Conjunct {
                source: source.clone(),
                env: PLAIN_ENV,
                closed: false,
                group: None,
            })
            .collect()
    }

    fn fills_below(&self, paths: &[Path]) -> bool {
        self.fills.iter().any(|(fill, _)| {
            paths
                .iter()
                .any(|path| fill.len() > path.len() && fill.starts_with(path))
        })
    }

    fn arc(&mut self, vertex: VertexId, label: &Label, required: bool) -> VertexId {
        if let Some(arc) = self.vertices[vertex].arcs.get_mut(label) {
            arc.required |= required;
            return arc.vertex;
        }
        let selector = Selector::from(label);
        let paths: Vec<Path> = self.vertices[vertex]
            .paths
            .iter()
            .map(|path| path.child(selector.clone()))
            .collect();
        let seeds = self.fill_conjuncts(&paths);
        let required = required || !seeds.is_empty();
        let id = self.new_vertex(Some(vertex), paths, seeds);
        self.vertices[vertex]
            .arcs
            .insert(label.clone(), Arc { vertex: id, required });
        id
    }

    /// Register additional paths a vertex answers to, and pass them on to its arcs.
    fn add_paths(&mut self, vertex: VertexId, paths: Vec<Path>) {
        let mut added = Vec::new();
        for path in paths {
            if !self.vertices[vertex].paths.contains(&path) {
                self.vertices[vertex].paths.push(path.clone());
                added.push(path);
            }
        }
        if added.is_empty() {
            return;
        }

        let arcs: Vec<(Label, VertexId)> = self.vertices[vertex]
            .arcs
            .iter()
            .map(|(label, arc)| (label.clone(), arc.vertex))
            .collect();
        for (label, arc) in arcs {
            let selector = Selector::from(&label);
            let child_paths: Vec<Path> = added.iter().map(|p| p.child(selector.clone())).collect();
            let fills = self.fill_conjuncts(&child_paths);
            if !fills.is_empty() {
                if let Some(entry) = self.vertices[vertex].arcs.get_mut(&label) {
                    entry.required = true;
                }
            }
            let node = &mut self.vertices[arc];
            node.paths.extend(child_paths);
            node.seeds.extend(fills);
        }
    }

    fn meet(&mut self, vertex: VertexId, val: Val) {
        let current = mem::replace(&mut self.vertices[vertex].val, Val::top());
        self.vertices[vertex].val = current.meet(val);
    }

    fn record(&mut self, vertex: VertexId, error: EvalError) {
        if error.is_incomplete() {
            self.vertices[vertex].pending.push(error);
        } else {
            self.meet(vertex, Val::Bottom(error));
        }
    }

    fn required_arcs(&self, vertex: VertexId, regular_only: bool) -> Vec<(Label, VertexId)> {
        self.vertices[vertex]
            .arcs
            .iter()
            .filter(|(label, arc)| arc.required && (!regular_only || matches!(label, Label::Regular(_))))
            .map(|(label, arc)| (label.clone(), arc.vertex))
            .collect()
    }

    fn is_ancestor(&self, target: VertexId, vertex: VertexId) -> bool {
        let target = self.follow(target);
        let mut current = self.vertices[vertex].parent;
        while let Some(ancestor) = current {
            if self.follow(ancestor) == target {
                return true;
            }
            current = self.vertices[ancestor].parent;
        }
        false
    }

    // ============================================================
    // Processing
    // ============================================================

    fn process(&mut self, vertex: VertexId) {
        if self.vertices[vertex].state != State::Pending {
            return;
        }
        if self.depth >= MAX_DEPTH {
            let error = EvalError::new(ErrorKind::Cycle, "evaluation depth exceeded")
                .at(self.path_string(vertex));
            self.meet(vertex, Val::Bottom(error));
            self.vertices[vertex].state = State::Done;
            return;
        }
        self.depth += 1;
        self.vertices[vertex].state = State::Processing;

        let mut work: VecDeque<Conjunct<'p>> = self.vertices[vertex].seeds.iter().cloned().collect();
        let mut processed = Vec::new();
        let mut disjunctions = Vec::new();
        while let Some(conjunct) = work.pop_front() {
            self.add_conjunct(vertex, conjunct, &mut work, &mut processed, &mut disjunctions);
        }

        if disjunctions.is_empty() || self.vertices[vertex].val.is_bottom() {
            self.finalize(vertex);
        } else {
            self.decide(vertex, processed, disjunctions);
        }

        self.vertices[vertex].state = State::Done;
        self.depth -= 1;
    }

    fn add_conjunct(
        &mut self,
        vertex: VertexId,
        conjunct: Conjunct<'p>,
        work: &mut VecDeque<Conjunct<'p>>,
        processed: &mut Vec<Conjunct<'p>>,
        disjunctions: &mut Vec<Vec<Alternative<'p>>>,
    ) {
        let expr = match &conjunct.source {
            Source::Expr(expr) => *expr,
            Source::Error(error) => {
                self.meet(vertex, Val::Bottom(error.clone()));
                processed.push(conjunct);
                return;
            }
        };

        match expr {
            Expr::Top => {}
            Expr::Bottom => self.meet(
                vertex,
                Val::Bottom(EvalError::conflict("explicit error (_|_ literal)")),
            ),
            Expr::Null => self.meet(vertex, Val::Atom(Scalar::Null)),
            Expr::Bool(b) => self.meet(vertex, Val::Atom(Scalar::Bool(*b))),
            Expr::Int(i) => self.meet(vertex, Val::Atom(Scalar::Int(*i))),
            Expr::Float(f) => self.meet(vertex, Val::Atom(Scalar::Float(OrderedFloat(*f)))),
            Expr::String(s) => self.meet(vertex, Val::Atom(Scalar::Str(s.clone()))),
            Expr::Struct(lit) => self.add_struct(vertex, lit, &conjunct, work),
            Expr::List(lit) => {
                self.meet(vertex, Val::kind(Kind::LIST));
                self.vertices[vertex].lists.push(ListConj {
                    elems: &lit.elems,
                    tail: lit.tail.as_deref(),
                    env: conjunct.env,
                    closed: conjunct.closed,
                });
            }
            Expr::Binary(BinaryOp::Unify, lhs, rhs) => {
                work.push_back(Conjunct {
                    source: Source::Expr(&**lhs),
                    ..conjunct.clone()
                });
                work.push_back(Conjunct {
                    source: Source::Expr(&**rhs),
                    ..conjunct
                });
                return;
            }
            Expr::Binary(BinaryOp::Disjoin, ..) | Expr::Default(_) => {
                let mut alternatives = Vec::new();
                flatten(expr, &conjunct, false, &mut alternatives);
                disjunctions.push(alternatives);
                return;
            }
            Expr::Ident(_) | Expr::Select(..) | Expr::Index(..) => {
                self.add_reference(vertex, expr, &conjunct, work, processed);
                return;
            }
            Expr::Unary(op, operand) => match BoundOp::from_unary(*op) {
                Some(op) => match self.eval_scalar(operand, conjunct.env) {
                    Ok(value) => {
                        let bound = Bound { op, value };
                        let constraint = Constraint {
                            kinds: bound.kinds(),
                            bounds: vec![bound],
                        };
                        self.meet(vertex, Val::Constraint(constraint));
                    }
                    Err(error) => self.record(vertex, error),
                },
                None => self.add_scalar(vertex, expr, conjunct.env),
            },
            Expr::Binary(..) | Expr::Call(..) => self.add_scalar(vertex, expr, conjunct.env),
        }
        processed.push(conjunct);
    }

    fn add_scalar(&mut self, vertex: VertexId, expr: &'p Expr, env: EnvId) {
        match self.eval_scalar(expr, env) {
            Ok(scalar) => self.meet(vertex, Val::Atom(scalar)),
            Err(error) => self.record(vertex, error),
        }
    }

    fn add_struct(
        &mut self,
        vertex: VertexId,
        lit: &'p StructLit,
        conjunct: &Conjunct<'p>,
        work: &mut VecDeque<Conjunct<'p>>,
    ) {
        self.meet(vertex, Val::kind(Kind::STRUCT));
        let env = self.new_env(Env::Struct {
            parent: conjunct.env,
            lit,
            vertex,
        });
        let group = match (conjunct.closed, conjunct.group) {
            (false, _) => None,
            (true, Some(group)) if group < self.vertices[vertex].groups.len() => Some(group),
            (true, _) => {
                self.vertices[vertex].groups.push(Group::default());
                Some(self.vertices[vertex].groups.len() - 1)
            }
        };

        for decl in &lit.decls {
            match decl {
                Decl::Field {
                    label,
                    optional,
                    value,
                } => {
                    let arc = self.arc(vertex, label, !optional);
                    self.vertices[arc]
                        .seeds
                        .push(Conjunct::expr(value, env, conjunct.closed));
                    if let Some(group) = group {
                        self.vertices[vertex].groups[group].labels.push(label.clone());
                    }
                }
                Decl::Pattern { label, value } => {
                    self.vertices[vertex].patterns.push(Pattern {
                        label,
                        value,
                        env,
                        closed: conjunct.closed,
                    });
                    if let Some(group) = group {
                        self.vertices[vertex].groups[group].patterns.push((label, env));
                    }
                }
                Decl::Ellipsis => {
                    if let Some(group) = group {
                        self.vertices[vertex].groups[group].open = true;
                    }
                }
                Decl::Embed(expr) => work.push_back(Conjunct {
                    source: Source::Expr(expr),
                    env,
                    closed: conjunct.closed,
                    group,
                }),
            }
        }
    }

    fn add_reference(
        &mut self,
        vertex: VertexId,
        expr: &'p Expr,
        conjunct: &Conjunct<'p>,
        work: &mut VecDeque<Conjunct<'p>>,
        processed: &mut Vec<Conjunct<'p>>,
    ) {
        let target = match self.resolve(expr, conjunct.env) {
            Ok(Resolved::Vertex(target)) => target,
            Ok(Resolved::Val(val)) => {
                self.meet(vertex, val);
                processed.push(conjunct.clone());
                return;
            }
            Ok(Resolved::Builtin(builtin)) => {
                let message = format!("cannot use builtin {} as a value", builtin.name());
                self.meet(vertex, Val::Bottom(EvalError::conflict(message)));
                return;
            }
            Ok(Resolved::Package(package)) => {
                let message = format!("cannot use package {package} as a value");
                self.meet(vertex, Val::Bottom(EvalError::conflict(message)));
                return;
            }
            Err(error) => {
                self.record(vertex, error);
                processed.push(conjunct.clone());
                return;
            }
        };

        if target == vertex || self.follow(target) == self.follow(vertex) {
            return;
        }
        if self.is_ancestor(target, vertex) {
            let message = format!("structural cycle: reference to {}", self.path_string(target));
            self.meet(vertex, Val::Bottom(EvalError::new(ErrorKind::Cycle, message)));
            return;
        }
        if !self.vertices[vertex].copied.insert(target) {
            return;
        }

        let closed = conjunct.closed
            || self.vertices[target]
                .paths
                .first()
                .is_some_and(Path::has_definition);
        let seeds = self.vertices[target].seeds.clone();
        let paths = self.vertices[target].paths.clone();
        self.add_paths(vertex, paths);
        for seed in seeds {
            work.push_back(Conjunct {
                closed: seed.closed || closed,
                group: conjunct.group,
                ..seed
            });
        }
    }

    fn finalize(&mut self, vertex: VertexId) {
        if self.vertices[vertex].val.is_bottom() {
            return;
        }
        self.build_list(vertex);
        self.ensure_fill_arcs(vertex);
        self.apply_patterns(vertex);
        self.check_closedness(vertex);
    }

    fn build_list(&mut self, vertex: VertexId) {
        let lists = mem::take(&mut self.vertices[vertex].lists);
        if lists.is_empty() {
            return;
        }

        self.vertices[vertex].open_list = lists.iter().all(|list| list.tail.is_some());
        let longest = lists.iter().map(|list| list.elems.len()).max().unwrap_or(0);
        let mut fixed = lists
            .iter()
            .filter(|list| list.tail.is_none())
            .map(|list| list.elems.len());
        let len = match fixed.next() {
            Some(len) => {
                if let Some(other) = fixed.find(|other| *other != len).or((longest > len).then_some(longest)) {
                    let message = format!("incompatible list lengths ({len} and {other})");
                    self.meet(vertex, Val::Bottom(EvalError::conflict(message)));
                    return;
                }
                len
            }
            None => longest,
        };

        for index in 0..len {
            let paths: Vec<Path> = self.vertices[vertex]
                .paths
                .iter()
                .map(|path| path.child(Selector::Index(index)))
                .collect();
            let mut seeds = self.fill_conjuncts(&paths);
            for list in &lists {
                if let Some(elem) = list.elems.get(index) {
                    seeds.push(Conjunct::expr(elem, list.env, list.closed));
                } else if let Some(tail) = list.tail {
                    seeds.push(Conjunct::expr(tail, list.env, list.closed));
                }
            }
            let elem = self.new_vertex(Some(vertex), paths, seeds);
            self.vertices[vertex].elems.push(elem);
        }
    }

    fn ensure_fill_arcs(&mut self, vertex: VertexId) {
        let mut selectors: Vec<Selector> = Vec::new();
        for (fill, _) in &self.fills {
            if self.is_withheld(fill) {
                continue;
            }
            for path in &self.vertices[vertex].paths {
                if fill.len() > path.len() && fill.starts_with(path) {
                    let selector = fill.selectors()[path.len()].clone();
                    if !selectors.contains(&selector) {
                        selectors.push(selector);
                    }
                }
            }
        }

        for selector in selectors {
            match selector {
                Selector::Index(index) => {
                    let len = self.vertices[vertex].elems.len();
                    if index >= len {
                        let message = format!("index {index} out of range (list has {len} elements)");
                        self.meet(vertex, Val::Bottom(EvalError::reference(message)));
                    }
                }
                _ => {
                    if let Some(label) = selector.label() {
                        self.meet(vertex, Val::kind(Kind::STRUCT));
                        self.arc(vertex, &label, true);
                    }
                }
            }
        }
    }

    fn apply_patterns(&mut self, vertex: VertexId) {
        let patterns = self.vertices[vertex].patterns.clone();
        if patterns.is_empty() {
            return;
        }
        for (name, arc) in self.regular_arcs(vertex) {
            for pattern in &patterns {
                if self.label_matches(pattern.label, pattern.env, &name) {
                    self.vertices[arc]
                        .seeds
                        .push(Conjunct::expr(pattern.value, pattern.env, pattern.closed));
                }
            }
        }
    }

    fn check_closedness(&mut self, vertex: VertexId) {
        let groups = self.vertices[vertex].groups.clone();
        if groups.is_empty() {
            return;
        }
        for (name, arc) in self.regular_arcs(vertex) {
            let label = Label::Regular(name.clone());
            let mut allowed = true;
            for group in &groups {
                let admitted = group.open
                    || group.labels.contains(&label)
                    || group
                        .patterns
                        .iter()
                        .any(|&(expr, env)| self.label_matches(expr, env, &name));
                if !admitted {
                    allowed = false;
                    break;
                }
            }
            if !allowed {
                let error = EvalError::new(ErrorKind::NotAllowed, format!("field not allowed: {name}"));
                self.vertices[arc].seeds.push(Conjunct::error(error));
            }
        }
    }

    fn regular_arcs(&self, vertex: VertexId) -> Vec<(String, VertexId)> {
        self.vertices[vertex]
            .arcs
            .iter()
            .filter_map(|(label, arc)| match label {
                Label::Regular(name) => Some((name.clone(), arc.vertex)),
                _ => None,
            })
            .collect()
    }

    fn label_matches(&mut self, expr: &'p Expr, env: EnvId, name: &str) -> bool {
        let temp = self.temp(expr, env);
        self.admits(temp, &Scalar::Str(name.to_string()))
    }

    fn admits(&mut self, vertex: VertexId, atom: &Scalar) -> bool {
        self.process(vertex);
        let vertex = self.follow(vertex);
        let disjuncts = self.vertices[vertex].disjuncts.clone();
        if !disjuncts.is_empty() {
            return disjuncts.into_iter().any(|d| self.admits(d, atom));
        }
        !self.vertices[vertex]
            .val
            .clone()
            .meet(Val::Atom(atom.clone()))
            .is_bottom()
    }

    // ============================================================
    // Disjunctions
    // ============================================================

    fn decide(
        &mut self,
        vertex: VertexId,
        processed: Vec<Conjunct<'p>>,
        disjunctions: Vec<Vec<Alternative<'p>>>,
    ) {
        let mut combinations: Vec<Vec<usize>> = vec![Vec::new()];
        for alternatives in &disjunctions {
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    (0..alternatives.len()).map(move |choice| {
                        let mut combination = prefix.clone();
                        combination.push(choice);
                        combination
                    })
                })
                .collect();
            if combinations.len() > MAX_COMBINATIONS {
                let error = EvalError::new(ErrorKind::Disjunction, "too many disjunction alternatives");
                self.meet(vertex, Val::Bottom(error));
                return;
            }
        }

        let marked: Vec<bool> = disjunctions
            .iter()
            .map(|alternatives| alternatives.iter().any(|(_, default)| *default))
            .collect();
        let parent = self.vertices[vertex].parent;
        let paths = self.vertices[vertex].paths.clone();
        let copied = self.vertices[vertex].copied.clone();

        let mark = self.withheld.len();
        self.withheld.extend(paths.iter().cloned());
        let mut survivors: Vec<(usize, VertexId, bool)> = Vec::new();
        let mut failures = Vec::new();
        for (index, combination) in combinations.iter().enumerate() {
            let (seeds, is_default) = combination_seeds(&processed, &disjunctions, &marked, combination);
            let clone = self.new_vertex(parent, paths.clone(), seeds);
            self.vertices[clone].copied = copied.clone();

            self.vertices[vertex].forward = Some(clone);
            let mut errors = Vec::new();
            self.collect(clone, false, &mut errors, 0);
            self.vertices[vertex].forward = None;

            if errors.iter().all(EvalError::is_incomplete) {
                survivors.push((index, clone, is_default));
            } else {
                failures.extend(errors.into_iter().filter(|e| !e.is_incomplete()));
            }
        }
        self.withheld.truncate(mark);

        trace!(
            path = %self.path_string(vertex),
            alternatives = combinations.len(),
            survivors = survivors.len(),
            "decided disjunction"
        );

        if survivors.is_empty() {
            let mut error = EvalError::new(ErrorKind::Disjunction, "no disjunct matched");
            error.causes = failures;
            self.meet(vertex, Val::Bottom(error));
            return;
        }
        if survivors.iter().any(|(_, _, default)| *default) {
            survivors.retain(|(_, _, default)| *default);
        }
        if survivors.len() > 1 && self.all_equal(&survivors) {
            survivors.truncate(1);
        }

        if let [(index, clone, _)] = survivors[..] {
            let winner = if self.fills_below(&paths) {
                let (seeds, _) = combination_seeds(&processed, &disjunctions, &marked, &combinations[index]);
                let fresh = self.new_vertex(parent, paths, seeds);
                self.vertices[fresh].copied = copied;
                fresh
            } else {
                clone
            };
            self.vertices[vertex].forward = Some(winner);
            self.process(winner);
            return;
        }

        let mut kinds = Kind::empty();
        let mut described = Vec::new();
        for &(_, clone, _) in &survivors {
            let clone = self.follow(clone);
            kinds |= self.vertices[clone].val.kinds();
            described.push(self.describe(clone));
        }
        let node = &mut self.vertices[vertex];
        node.val = Val::kind(kinds);
        node.disjuncts = survivors.iter().map(|(_, clone, _)| *clone).collect();
        node.pending.push(EvalError::incomplete(format!(
            "incomplete value: unresolved disjunction {}",
            described.join(" | ")
        )));
    }

    fn all_equal(&mut self, survivors: &[(usize, VertexId, bool)]) -> bool {
        let mut first = None;
        for &(_, clone, _) in survivors {
            let Ok(exported) = self.export(clone) else {
                return false;
            };
            match &first {
                None => first = Some(exported),
                Some(first) if *first == exported => {}
                Some(_) => return false,
            }
        }
        true
    }

    fn describe(&self, vertex: VertexId) -> String {
        match &self.vertices[vertex].val {
            Val::Constraint(c) if c.kinds == Kind::STRUCT => "{...}".to_string(),
            Val::Constraint(c) if c.kinds == Kind::LIST => "[...]".to_string(),
            val => val.to_string(),
        }
    }

    // ============================================================
    // References and scalar evaluation
    // ============================================================

    fn resolve(&mut self, expr: &'p Expr, env: EnvId) -> Result<Resolved<'p>, EvalError> {
        match expr {
            Expr::Ident(name) => self.resolve_ident(name, env),
            Expr::Select(base, label) => match self.resolve(base, env)? {
                Resolved::Vertex(vertex) => self
                    .select(vertex, &Selector::from(label))
                    .map(Resolved::Vertex),
                Resolved::Package(package) => {
                    let name = label.to_string();
                    builtins::member(package, &name)
                        .map(Resolved::Builtin)
                        .ok_or_else(|| EvalError::reference(format!("undefined: {package}.{name}")))
                }
                _ => Err(EvalError::reference(format!(
                    "cannot select {label} from a non-struct value"
                ))),
            },
            Expr::Index(base, index) => {
                let vertex = match self.resolve(base, env)? {
                    Resolved::Vertex(vertex) => vertex,
                    _ => return Err(EvalError::reference("cannot index a non-list value")),
                };
                let selector = match self.eval_scalar(index, env)? {
                    Scalar::Int(i) => usize::try_from(i)
                        .map(Selector::Index)
                        .map_err(|_| EvalError::reference(format!("invalid index {i}")))?,
                    Scalar::Str(name) => Selector::Field(name),
                    other => return Err(EvalError::reference(format!("invalid index {other}"))),
                };
                self.select(vertex, &selector).map(Resolved::Vertex)
            }
            _ => Err(EvalError::reference("expression is not a reference")),
        }
    }

    fn resolve_ident(&mut self, name: &'p str, env: EnvId) -> Result<Resolved<'p>, EvalError> {
        let label = Label::from_ident(name);
        let mut current = env;
        loop {
            match self.envs[current] {
                Env::Struct { parent, lit, vertex } => {
                    if lit.declares(&label) {
                        let vertex = self.follow(vertex);
                        return self.vertices[vertex]
                            .arcs
                            .get(&label)
                            .map(|arc| Resolved::Vertex(arc.vertex))
                            .ok_or_else(|| {
                                EvalError::new(ErrorKind::Cycle, format!("cyclic reference to {label}"))
                            });
                    }
                    current = parent;
                }
                Env::Root { imports } => {
                    let root = self.follow(ROOT);
                    if let Some(arc) = self.vertices[root].arcs.get(&label) {
                        return Ok(Resolved::Vertex(arc.vertex));
                    }
                    if let Some(val) = builtins::type_constraint(name) {
                        return Ok(Resolved::Val(val));
                    }
                    if let Some(builtin) = builtins::function(name) {
                        return Ok(Resolved::Builtin(builtin));
                    }
                    if builtins::is_package(name) && imports.iter().any(|import| import == name) {
                        return Ok(Resolved::Package(name));
                    }
                    return Err(EvalError::reference(format!("reference {name:?} not found")));
                }
            }
        }
    }

    fn select(&mut self, vertex: VertexId, selector: &Selector) -> Result<VertexId, EvalError> {
        self.process(vertex);
        let vertex = self.follow(vertex);
        self.process(vertex);

        let node = &self.vertices[vertex];
        if !node.disjuncts.is_empty() {
            return Err(EvalError::incomplete(format!(
                "cannot select {selector} from an unresolved disjunction"
            )));
        }
        let found = match selector {
            Selector::Index(index) => node.elems.get(*index).copied(),
            _ => selector
                .label()
                .and_then(|label| node.arcs.get(&label))
                .map(|arc| arc.vertex),
        };
        if let Some(found) = found {
            return Ok(found);
        }

        if let Val::Bottom(error) = &node.val {
            return Err(error.clone());
        }
        if node.state == State::Processing {
            return Err(EvalError::new(
                ErrorKind::Cycle,
                format!("cyclic reference to {}", self.path_string(vertex)),
            ));
        }
        match selector {
            Selector::Index(index) if node.val.kinds() == Kind::LIST && !node.open_list => Err(EvalError::reference(
                format!("index {index} out of range (list has {} elements)", node.elems.len()),
            )),
            Selector::Index(index) => Err(EvalError::incomplete(format!(
                "cannot index {} with {index}",
                node.val
            ))),
            _ if node.groups.is_empty() => {
                Err(EvalError::incomplete(format!("undefined field: {selector}")))
            }
            _ => Err(EvalError::reference(format!("undefined field: {selector}"))),
        }
    }

    fn eval_scalar(&mut self, expr: &'p Expr, env: EnvId) -> Result<Scalar, EvalError> {
        match expr {
            Expr::Null => Ok(Scalar::Null),
            Expr::Bool(b) => Ok(Scalar::Bool(*b)),
            Expr::Int(i) => Ok(Scalar::Int(*i)),
            Expr::Float(f) => Ok(Scalar::Float(OrderedFloat(*f))),
            Expr::String(s) => Ok(Scalar::Str(s.clone())),
            Expr::Unary(op, operand) if BoundOp::from_unary(*op).is_none() => {
                ops::unary(*op, self.eval_scalar(operand, env)?)
            }
            Expr::Binary(op, lhs, rhs) if !matches!(op, BinaryOp::Unify | BinaryOp::Disjoin) => {
                let lhs = self.eval_scalar(lhs, env);
                let rhs = self.eval_scalar(rhs, env);
                match (lhs, rhs) {
                    (Ok(lhs), Ok(rhs)) => ops::binary(*op, lhs, rhs),
                    (Err(lhs), Err(rhs)) if lhs.is_incomplete() => Err(rhs),
                    (Err(error), _) | (_, Err(error)) => Err(error),
                }
            }
            Expr::Ident(_) | Expr::Select(..) | Expr::Index(..) => match self.resolve(expr, env)? {
                Resolved::Vertex(vertex) => self.scalar_of(vertex),
                Resolved::Val(val) => Err(EvalError::incomplete(format!("non-concrete value {val}"))),
                Resolved::Builtin(builtin) => Err(EvalError::conflict(format!(
                    "cannot use builtin {} as a value",
                    builtin.name()
                ))),
                Resolved::Package(package) => {
                    Err(EvalError::conflict(format!("cannot use package {package} as a value")))
                }
            },
            Expr::Call(func, args) => self.call(func, args, env),
            _ => {
                let temp = self.temp(expr, env);
                self.scalar_of(temp)
            }
        }
    }

    fn scalar_of(&mut self, vertex: VertexId) -> Result<Scalar, EvalError> {
        self.process(vertex);
        let vertex = self.follow(vertex);
        let path = self.path_string(vertex);
        let node = &self.vertices[vertex];
        if node.state == State::Processing {
            return Err(EvalError::new(ErrorKind::Cycle, format!("cyclic reference to {path}")));
        }
        if let Val::Bottom(error) = &node.val {
            return Err(error.clone().at(path));
        }
        if let Some(error) = node.pending.first() {
            return Err(error.clone().at(path));
        }
        match &node.val {
            Val::Atom(scalar) => Ok(scalar.clone()),
            Val::Constraint(c) if c.kinds == Kind::STRUCT || c.kinds == Kind::LIST => Err(
                EvalError::conflict(format!("cannot use {} as a scalar", c.kinds)).at(path),
            ),
            other => Err(EvalError::incomplete(format!("incomplete value {other}")).at(path)),
        }
    }

    fn call(&mut self, func: &'p Expr, args: &'p [Expr], env: EnvId) -> Result<Scalar, EvalError> {
        let builtin = match self.resolve(func, env)? {
            Resolved::Builtin(builtin) => builtin,
            _ => return Err(EvalError::conflict("cannot call a non-function value")),
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let vertex = if arg.is_reference() {
                match self.resolve(arg, env)? {
                    Resolved::Vertex(vertex) => vertex,
                    Resolved::Val(val) => {
                        return Err(EvalError::incomplete(format!("non-concrete value {val}")))
                    }
                    _ => return Err(EvalError::conflict("invalid builtin argument")),
                }
            } else {
                self.temp(arg, env)
            };
            values.push(self.export(vertex)?);
        }
        builtins::call(builtin, &values)
    }

    // ============================================================
    // Validation and export
    // ============================================================

    fn collect(&mut self, vertex: VertexId, concrete: bool, out: &mut Vec<EvalError>, depth: usize) {
        if depth > MAX_DEPTH {
            out.push(EvalError::new(ErrorKind::Cycle, "value too deeply nested"));
            return;
        }
        self.process(vertex);
        let vertex = self.follow(vertex);
        let path = self.path_string(vertex);
        let node = &self.vertices[vertex];

        if let Val::Bottom(error) = &node.val {
            out.push(error.clone().at(path));
            return;
        }
        if !node.pending.is_empty() {
            if concrete {
                out.extend(node.pending.iter().map(|e| e.clone().at(path.clone())));
            }
            return;
        }

        let kinds = node.val.kinds();
        if kinds == Kind::STRUCT {
            for (label, arc) in self.required_arcs(vertex, false) {
                let concrete = concrete && matches!(label, Label::Regular(_));
                self.collect(arc, concrete, out, depth + 1);
            }
        } else if kinds == Kind::LIST {
            for elem in node.elems.clone() {
                self.collect(elem, concrete, out, depth + 1);
            }
        } else if concrete && !matches!(node.val, Val::Atom(_)) {
            out.push(EvalError::incomplete(format!("incomplete value {}", node.val)).at(path));
        }
    }

    fn export_at(&mut self, vertex: VertexId, depth: usize) -> Result<Json, EvalError> {
        if depth > MAX_DEPTH {
            return Err(EvalError::new(ErrorKind::Cycle, "value too deeply nested"));
        }
        self.process(vertex);
        let vertex = self.follow(vertex);
        let path = self.path_string(vertex);
        let node = &self.vertices[vertex];
        if node.state == State::Processing {
            return Err(EvalError::new(ErrorKind::Cycle, format!("cyclic reference to {path}")));
        }
        if let Val::Bottom(error) = &node.val {
            return Err(error.clone().at(path));
        }
        if let Some(error) = node.pending.first() {
            return Err(error.clone().at(path));
        }

        let elems = node.elems.clone();
        match node.val.clone() {
            Val::Atom(scalar) => scalar_to_json(&scalar).map_err(|e| e.at(path)),
            Val::Constraint(c) if c.kinds == Kind::STRUCT => {
                let mut object = Map::new();
                for (label, arc) in self.required_arcs(vertex, true) {
                    object.insert(label.to_string(), self.export_at(arc, depth + 1)?);
                }
                Ok(Json::Object(object))
            }
            Val::Constraint(c) if c.kinds == Kind::LIST => elems
                .into_iter()
                .map(|elem| self.export_at(elem, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            other => Err(EvalError::incomplete(format!("incomplete value {other}")).at(path)),
        }
    }
}

fn flatten<'p>(expr: &'p Expr, conjunct: &Conjunct<'p>, default: bool, out: &mut Vec<Alternative<'p>>) {
    match expr {
        Expr::Binary(BinaryOp::Disjoin, lhs, rhs) => {
            flatten(lhs, conjunct, default, out);
            flatten(rhs, conjunct, default, out);
        }
        Expr::Default(inner) => flatten(inner, conjunct, true, out),
        _ => out.push((
            Conjunct {
                source: Source::Expr(expr),
                ..conjunct.clone()
            },
            default,
        )),
    }
}

fn combination_seeds<'p>(
    processed: &[Conjunct<'p>],
    disjunctions: &[Vec<Alternative<'p>>],
    marked: &[bool],
    combination: &[usize],
) -> (Vec<Conjunct<'p>>, bool) {
    let mut seeds = processed.to_vec();
    let mut is_default = true;
    for ((alternatives, &choice), &has_default) in disjunctions.iter().zip(combination).zip(marked) {
        let (conjunct, default) = &alternatives[choice];
        seeds.push(conjunct.clone());
        if has_default && !default {
            is_default = false;
        }
    }
    (seeds, is_default)
}
