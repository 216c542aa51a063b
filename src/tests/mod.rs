// Licensed under the Apache-2.0 license

//! Host-side test support and cross-module scenarios.


mod functional;
