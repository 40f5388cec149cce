use crate::index::StarKind;

/// A tag parameter, given either as an attribute or as a same-named child
/// element whose content is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Literal(String),
    Nodes(Vec<Node>),
}

/// Word-level text transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Uppercase,
    Lowercase,
    Formal,
    Sentence,
    Explode,
    Normalize,
    Denormalize,
    First,
    Rest,
    Person,
    Person2,
    Gender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Input,
    Request,
    Response,
}

/// How long a learned category lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// `<learn>`: matchable until the process exits.
    Session,
    /// `<learnf>`: also handed to the store.
    Persistent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Srai(Vec<Node>),
    Sr,
    Random(Vec<Vec<Node>>),
    Condition(Box<Condition>),
    Set {
        name: Option<Param>,
        var: Option<Param>,
        body: Vec<Node>,
    },
    Get {
        name: Option<Param>,
        var: Option<Param>,
        tuple: Option<Param>,
    },
    Bot(Option<Param>),
    Map {
        name: Option<Param>,
        body: Vec<Node>,
    },
    Sraix(Box<Sraix>),
    Star {
        kind: StarKind,
        index: Option<Param>,
    },
    That(Option<Param>),
    History(HistoryKind, Option<Param>),
    Think(Vec<Node>),
    Eval(Vec<Node>),
    Shape(Shape, Vec<Node>),
    Date(Option<Param>),
    Interval(Box<Interval>),
    Id,
    Size,
    Vocabulary,
    Program,
    Learn(Persistence, Vec<LearnCategory>),
    /// `<resetlearn/>` / `<resetlearnf/>`: forget what was learned at that level.
    ResetLearn(Persistence),
    AddTriple(Box<TripleArgs>),
    DeleteTriple(Box<TripleArgs>),
    Select(Box<Select>),
    Uniq(Box<TripleArgs>),
    Loop,
    Markup(Box<Markup>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub name: Option<Param>,
    pub var: Option<Param>,
    pub value: Option<Param>,
    pub body: Vec<Node>,
    pub items: Vec<ConditionItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionItem {
    pub name: Option<Param>,
    pub var: Option<Param>,
    pub value: Option<Param>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sraix {
    pub host: Option<Param>,
    pub botid: Option<Param>,
    pub hint: Option<Param>,
    pub service: Option<Param>,
    pub fallback: Option<Param>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub style: Option<Param>,
    pub format: Option<Param>,
    pub from: Option<Param>,
    pub to: Option<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripleArgs {
    pub subj: Option<Param>,
    pub pred: Option<Param>,
    pub obj: Option<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub vars: Option<Param>,
    pub clauses: Vec<QueryClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryClause {
    pub args: TripleArgs,
    pub affirmative: bool,
}

/// A category embedded in `<learn>`. Its markup stays raw except for
/// `<eval>` holes, which run when the learn tag is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnCategory {
    pub pattern: Vec<LearnPart>,
    pub that: Option<Vec<LearnPart>>,
    pub topic: Option<Vec<LearnPart>>,
    pub template: Vec<LearnPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LearnPart {
    Text(String),
    Tag(String),
    Eval(Vec<Node>),
}

/// Any element outside the closed vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Markup {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Children with the tag name of those that are elements.
    pub children: Vec<(Option<String>, Node)>,
}
