//! The facts a compiled rule is evaluated against, gathered once per
//! request/connection by the dispatcher (C8) before the router scan.

use http::{HeaderMap, Method};
use std::net::IpAddr;

pub struct MatchContext<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub query: &'a str,
    pub client_ip: IpAddr,
}
