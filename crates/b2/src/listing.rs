//! File listings
//!
//! Listing calls return one page and a cursor. [`FileNamePages`] and
//! [`FileVersionPages`] follow the cursors until the last page.

use b2_core::{Error, FileDescriptor, ListCursor, ListingPage, Result};

use crate::bucket::Bucket;
use crate::wire::{
    ListFileNamesRequest, ListFileNamesResponse, ListFileVersionsRequest, ListFileVersionsResponse,
};

/// Largest page the service accepts
pub const MAX_PAGE_SIZE: u32 = 10_000;

fn check_page_size(max_file_count: u32) -> Result<()> {
    if max_file_count == 0 || max_file_count > MAX_PAGE_SIZE {
        return Err(Error::InvalidArgument(format!(
            "maxFileCount must be between 1 and {MAX_PAGE_SIZE}, got {max_file_count}"
        )));
    }
    Ok(())
}

impl Bucket {
    /// One page of file names, starting at `start` (empty for the first page)
    pub async fn list_file_names(&self, start: &str, max_file_count: u32) -> Result<ListingPage> {
        self.list_file_names_with_prefix(start, max_file_count, None, None)
            .await
    }

    /// One page of file names restricted to `prefix`
    ///
    /// With a `delimiter`, names below the first delimiter after the prefix
    /// collapse into a single `folder` entry.
    pub async fn list_file_names_with_prefix(
        &self,
        start: &str,
        max_file_count: u32,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListingPage> {
        check_page_size(max_file_count)?;

        let response: ListFileNamesResponse = self
            .client()
            .call(
                "b2_list_file_names",
                &ListFileNamesRequest {
                    bucket_id: self.id(),
                    start_file_name: start,
                    max_file_count,
                    prefix,
                    delimiter,
                },
            )
            .await?;

        Ok(ListingPage {
            files: response.files,
            next: response
                .next_file_name
                .filter(|name| !name.is_empty())
                .map(ListCursor::from_name),
        })
    }

    /// One page of file versions, starting at (`start_name`, `start_id`)
    pub async fn list_file_versions(
        &self,
        start_name: &str,
        start_id: Option<&str>,
        max_file_count: u32,
    ) -> Result<ListingPage> {
        check_page_size(max_file_count)?;

        let response: ListFileVersionsResponse = self
            .client()
            .call(
                "b2_list_file_versions",
                &ListFileVersionsRequest {
                    bucket_id: self.id(),
                    start_file_name: start_name,
                    start_file_id: start_id,
                    max_file_count,
                },
            )
            .await?;

        Ok(ListingPage {
            files: response.files,
            next: response
                .next_file_name
                .filter(|name| !name.is_empty())
                .map(|file_name| ListCursor {
                    file_name,
                    file_id: response.next_file_id,
                }),
        })
    }

    /// Page through every file name in the bucket
    pub fn file_names(&self, page_size: u32) -> FileNamePages<'_> {
        FileNamePages {
            bucket: self,
            page_size,
            prefix: None,
            cursor: Some(ListCursor::default()),
        }
    }

    /// Page through every file version in the bucket
    pub fn file_versions(&self, page_size: u32) -> FileVersionPages<'_> {
        FileVersionPages {
            bucket: self,
            page_size,
            cursor: Some(ListCursor::default()),
        }
    }
}

/// Cursor-following iterator over `b2_list_file_names`
pub struct FileNamePages<'a> {
    bucket: &'a Bucket,
    page_size: u32,
    prefix: Option<String>,
    cursor: Option<ListCursor>,
}

impl FileNamePages<'_> {
    /// Only list names starting with `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// The next page, or `None` after the last one
    pub async fn next_page(&mut self) -> Result<Option<Vec<FileDescriptor>>> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };

        let page = self
            .bucket
            .list_file_names_with_prefix(
                &cursor.file_name,
                self.page_size,
                self.prefix.as_deref(),
                None,
            )
            .await?;

        self.cursor = page.next;
        Ok(Some(page.files))
    }

    /// Every remaining entry, in listing order
    pub async fn collect_all(mut self) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        while let Some(page) = self.next_page().await? {
            files.extend(page);
        }
        Ok(files)
    }
}

/// Cursor-following iterator over `b2_list_file_versions`
pub struct FileVersionPages<'a> {
    bucket: &'a Bucket,
    page_size: u32,
    cursor: Option<ListCursor>,
}

impl FileVersionPages<'_> {
    /// Start at `name` instead of the beginning of the bucket
    pub fn starting_at(mut self, name: impl Into<String>) -> Self {
        self.cursor = Some(ListCursor::from_name(name));
        self
    }

    /// The next page, or `None` after the last one
    pub async fn next_page(&mut self) -> Result<Option<Vec<FileDescriptor>>> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };

        let page = self
            .bucket
            .list_file_versions(&cursor.file_name, cursor.file_id.as_deref(), self.page_size)
            .await?;

        self.cursor = page.next;
        Ok(Some(page.files))
    }

    pub async fn collect_all(mut self) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        while let Some(page) = self.next_page().await? {
            files.extend(page);
        }
        Ok(files)
    }
}
