// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::collections::HashMap;

use crate::error::Result;
use crate::operation::{OperationContext, OperationKind};
use crate::pkcs11::*;

/// A session holds at most one live operation
#[derive(Debug, Default)]
pub struct Session {
    operation: Option<OperationContext>,
}

impl Session {
    pub fn new() -> Session {
        Session { operation: None }
    }

    /// True while an operation is live (initialized and not finalized)
    pub fn has_operation(&self) -> bool {
        match &self.operation {
            Some(op) => !op.finalized(),
            None => false,
        }
    }

    pub fn set_operation(&mut self, op: OperationContext) -> Result<()> {
        if self.has_operation() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        self.operation = Some(op);
        Ok(())
    }

    /// Drops any operation; calling it with nothing active is fine
    pub fn cancel(&mut self) {
        self.operation = None;
    }

    /// Runs `f` against the live operation of the given kind. The
    /// operation is released once it finalizes or fails, except on
    /// CKR_BUFFER_TOO_SMALL which leaves it live for a retry.
    pub fn run<R, F>(&mut self, kind: OperationKind, f: F) -> Result<R>
    where
        F: FnOnce(&mut OperationContext) -> Result<R>,
    {
        let op = match self.operation.as_mut() {
            Some(op) if op.kind() == kind && !op.finalized() => op,
            _ => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
        };
        let ret = f(&mut *op);
        let release = op.finalized()
            || matches!(&ret, Err(e) if e.rv() != CKR_BUFFER_TOO_SMALL);
        if release {
            self.operation = None;
        }
        ret
    }
}

/// Sessions keyed by handle
#[derive(Debug)]
pub struct Sessions {
    next_handle: CK_SESSION_HANDLE,
    map: HashMap<CK_SESSION_HANDLE, Session>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

impl Sessions {
    pub fn new() -> Sessions {
        Sessions {
            next_handle: 1,
            map: HashMap::new(),
        }
    }

    pub fn open(&mut self) -> CK_SESSION_HANDLE {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.map.insert(handle, Session::new());
        handle
    }

    /// Closing drops any live operation along with the session
    pub fn close(&mut self, handle: CK_SESSION_HANDLE) -> Result<()> {
        match self.map.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(CKR_SESSION_HANDLE_INVALID)?,
        }
    }

    pub fn get_mut(
        &mut self,
        handle: CK_SESSION_HANDLE,
    ) -> Result<&mut Session> {
        match self.map.get_mut(&handle) {
            Some(s) => Ok(s),
            None => Err(CKR_SESSION_HANDLE_INVALID)?,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
