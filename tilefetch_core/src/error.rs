//! This module defines the `ResultCode` enum, classifying the outcome of a
//! read operation. Protocol-level failures travel inside read results
//! rather than as `Err` values, so callers always get the full response
//! context (duration, metadata, detail string) along with the code.

use std::fmt::Display;

/// Outcome classification for a typed read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResultCode {
	/// 200 response decoded successfully.
	Ok,
	/// Caller or transport aborted.
	Canceled,
	/// 404.
	NotFound,
	/// 304; the caller should treat its cached copy as fresh.
	NotModified,
	/// 401 or 403.
	Unauthorized,
	/// 5xx.
	ServerError,
	/// Connect or transfer timeout.
	Timeout,
	/// No decoder matched the content.
	NoReader,
	/// A decoder matched but failed to produce content.
	ReaderError,
	/// Anything else, including transport code 0 without a cancel flag.
	#[default]
	UnknownError,
}

impl ResultCode {
	/// Maps an HTTP status code to a result code. Only a plain 200 counts
	/// as `Ok`; code 0 (transport failure) and decoder outcomes are
	/// classified by the caller, which has the cancel flag and backend
	/// message at hand.
	#[must_use]
	pub fn from_status(code: u16) -> ResultCode {
		match code {
			200 => ResultCode::Ok,
			304 => ResultCode::NotModified,
			401 | 403 => ResultCode::Unauthorized,
			404 => ResultCode::NotFound,
			500..=599 => ResultCode::ServerError,
			_ => ResultCode::UnknownError,
		}
	}

	/// True for outcomes worth retrying after a delay.
	#[must_use]
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			ResultCode::ServerError | ResultCode::Timeout | ResultCode::Canceled
		)
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		*self == ResultCode::Ok
	}
}

impl Display for ResultCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			ResultCode::Ok => "ok",
			ResultCode::Canceled => "canceled",
			ResultCode::NotFound => "not-found",
			ResultCode::NotModified => "not-modified",
			ResultCode::Unauthorized => "unauthorized",
			ResultCode::ServerError => "server-error",
			ResultCode::Timeout => "timeout",
			ResultCode::NoReader => "no-reader",
			ResultCode::ReaderError => "reader-error",
			ResultCode::UnknownError => "unknown-error",
		})
	}
}
