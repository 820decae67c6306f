//! The predicate AST rule expressions compile into (spec §4.4 step 2):
//! `Host`, `HostRegexp`, `Path`, `PathPrefix`, `PathRegexp`, `Method`,
//! `Headers`, `HeaderRegexp`, `Query`, `ClientIP`, combined with `&&`,
//! `||`, `!`.

use regex::Regex;

#[derive(Debug)]
pub enum Rule {
    Host(Vec<String>),
    HostRegexp(Regex),
    Path(Vec<String>),
    PathPrefix(Vec<String>),
    PathRegexp(Regex),
    Method(Vec<String>),
    Headers(String, String),
    HeaderRegexp(String, Regex),
    Query(String, Option<String>),
    ClientIp(Vec<ipnet::IpNet>),
    And(Box<Rule>, Box<Rule>),
    Or(Box<Rule>, Box<Rule>),
    Not(Box<Rule>),
}
