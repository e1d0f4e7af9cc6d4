// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Answers encoded DNS queries from the record store.
//!
//! Each question is looked up by exact name and type. Every record found for any
//! question goes into the answer section. When no question yields an answer the
//! response carries NXDOMAIN.
//!
//! An A or AAAA question with no direct answer falls back to the CNAME group for
//! the same name, so the forwarding frontend can chase the alias itself.
//!
//! Queries are handled independently and concurrently with store mutations; the
//! store's lock is the only synchronization.

use crate::dns_errors::QueryError;
use crate::metrics;
use crate::store::RecordStore;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{Record, RecordType};
use std::sync::Arc;
use tracing::debug;

/// Stateless query front end over a shared [`RecordStore`].
#[derive(Clone, Debug)]
pub struct QueryService {
    store: Arc<RecordStore>,
}

impl QueryService {
    /// Create a query service reading from `store`.
    #[must_use]
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Decode `packet`, answer every question, and encode the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet does not decode as a DNS query or the
    /// response cannot be encoded.
    pub fn handle(&self, packet: &[u8]) -> Result<Vec<u8>, QueryError> {
        let request = Message::from_vec(packet).map_err(|e| {
            debug!(error = %e, "Rejecting malformed DNS packet");
            QueryError::MalformedPacket(e)
        })?;
        if request.message_type() != MessageType::Query {
            debug!(id = request.id(), "Rejecting DNS message that is not a query");
            return Err(QueryError::NotAQuery { id: request.id() });
        }

        let response = self.answer(&request);
        response.to_vec().map_err(QueryError::Encode)
    }

    /// Build the response message for an already decoded request.
    #[must_use]
    pub fn answer(&self, request: &Message) -> Message {
        let mut answers: Vec<Record> = Vec::new();
        for query in request.queries() {
            let name = query.name().to_ascii();
            let found = self.lookup(&name, query.query_type());
            debug!(
                name = %name,
                qtype = %query.query_type(),
                answers = found.len(),
                "Answered question"
            );
            answers.extend(found);
        }

        let code = if answers.is_empty() {
            ResponseCode::NXDomain
        } else {
            ResponseCode::NoError
        };
        for query in request.queries() {
            metrics::record_query(&query.query_type().to_string(), &format!("{code:?}"));
        }

        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(request.op_code())
            .set_authoritative(true)
            .set_recursion_desired(request.recursion_desired())
            .set_response_code(code);
        response.add_queries(request.queries().iter().cloned());
        response.add_answers(answers);
        response
    }

    fn lookup(&self, name: &str, query_type: RecordType) -> Vec<Record> {
        match self.store.get_resource_record(name, query_type) {
            Ok(records) => records,
            Err(_) if matches!(query_type, RecordType::A | RecordType::AAAA) => self
                .store
                .get_resource_record(name, RecordType::CNAME)
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod query_tests;
