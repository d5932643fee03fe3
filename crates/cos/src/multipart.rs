//! Multipart bookkeeping: part planning, the initiate response, and the
//! commit body.
//!
//! The server's XML payloads are tiny and fixed-shape, so they are
//! extracted and rendered by hand rather than through an XML library.

/// Default slice size for part uploads.
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// A planned slice of the source buffer. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub part_number: u32,
    pub offset: usize,
    pub len: usize,
}

/// Identity of one uploaded part, as needed by the commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Splits `total` bytes into contiguous `part_size` slices; the last
/// part carries the remainder. A zero `part_size` falls back to the
/// default.
pub fn plan_parts(total: usize, part_size: usize) -> Vec<PartPlan> {
    let part_size = if part_size == 0 {
        DEFAULT_PART_SIZE
    } else {
        part_size
    };
    let mut plans = Vec::with_capacity(total.div_ceil(part_size));
    let mut offset = 0;
    let mut part_number = 1;
    while offset < total {
        let len = part_size.min(total - offset);
        plans.push(PartPlan {
            part_number,
            offset,
            len,
        });
        offset += len;
        part_number += 1;
    }
    plans
}

/// Pulls the upload id out of an `InitiateMultipartUpload` response.
pub fn extract_upload_id(body: &str) -> Option<String> {
    let start = body.find("<UploadId>")? + "<UploadId>".len();
    let end = body[start..].find("</UploadId>")? + start;
    Some(body[start..end].to_string())
}

/// Renders the `CompleteMultipartUpload` body. Parts are listed in
/// ascending part-number order regardless of upload completion order;
/// the server rejects out-of-order commits.
pub fn complete_multipart_xml(parts: &[UploadedPart]) -> String {
    let mut sorted: Vec<&UploadedPart> = parts.iter().collect();
    sorted.sort_by_key(|part| part.part_number);

    let mut xml = String::from("<CompleteMultipartUpload>");
    for part in sorted {
        xml.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number, part.etag
        ));
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}
